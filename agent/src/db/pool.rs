//! Postgres connection pool management

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::errors::AgentError;
use crate::utils::safe_dsn;

/// Connect to the shared job store.
///
/// Fails hard at startup: an agent with no store connection has nothing
/// to do, so the caller surfaces this instead of retrying.
pub async fn connect(database_url: &str) -> Result<PgPool, AgentError> {
    let pool = PgPoolOptions::new()
        .min_connections(2)
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    info!("Connected to job store: {}", safe_dsn(database_url));
    Ok(pool)
}
