//! Error types for the Drydock agent

use thiserror::Error;

/// Main error type for the Drydock agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Claim error: {0}")]
    ClaimError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Bookkeeping error: {0}")]
    BookkeepingError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Maintenance error: {0}")]
    MaintenanceError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Internal(err.to_string())
    }
}
