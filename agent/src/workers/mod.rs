//! Background workers

pub mod agent;
pub mod heartbeat;
