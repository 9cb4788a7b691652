//! Database access layer
//!
//! All mutations of job status and artifact flags go through the stores
//! in this module; nothing else in the agent writes those columns.

pub mod artifacts;
pub mod control;
pub mod jobs;
pub mod models;
pub mod pool;
