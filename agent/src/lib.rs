//! Drydock Agent Library
//!
//! Single-instance deployment agent: claims deploy/rollback jobs from a
//! shared Postgres store and applies them against a Helm or Docker
//! Compose target.

pub mod app;
pub mod db;
pub mod deploy;
pub mod errors;
pub mod logs;
pub mod maintenance;
pub mod notify;
pub mod settings;
pub mod utils;
pub mod workers;
