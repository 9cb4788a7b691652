//! Agent control row: SMTP config, recipients, poller liveness

use sqlx::postgres::PgPool;
use tracing::{debug, info, warn};

use crate::db::models::{AdminContact, SmtpSettings};
use crate::errors::AgentError;

/// Client for the `agent_control` and `admin_contact` tables
#[derive(Clone)]
pub struct ControlStore {
    pool: PgPool,
}

impl ControlStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// SMTP configuration, if an operator has set one up.
    pub async fn smtp_settings(&self) -> Result<Option<SmtpSettings>, AgentError> {
        let settings = sqlx::query_as::<_, SmtpSettings>(
            "SELECT smtp_host, smtp_port, smtp_user, smtp_password, smtp_from \
             FROM agent_control LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        match &settings {
            Some(s) if s.smtp_host.is_some() => info!("SMTP configuration loaded"),
            _ => warn!("No SMTP configuration found, notifications disabled"),
        }
        Ok(settings)
    }

    /// Active recipients for deployment notifications.
    pub async fn active_admins(&self) -> Result<Vec<AdminContact>, AgentError> {
        let admins = sqlx::query_as::<_, AdminContact>(
            "SELECT id, name, email, is_active FROM admin_contact WHERE is_active = TRUE",
        )
        .fetch_all(&self.pool)
        .await?;

        debug!("Fetched {} active admin contacts", admins.len());
        Ok(admins)
    }

    /// Stamp poller liveness so operators can see the agent is alive.
    /// Best-effort: a failed write is logged, never escalated.
    pub async fn record_poll(&self) {
        let result = sqlx::query("UPDATE agent_control SET last_poll_at = NOW()")
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            warn!("Failed to record poll timestamp: {}", e);
        }
    }

    /// Mirror the maintenance gate state into the control row so the
    /// backend UI can display it. Best-effort.
    pub async fn set_maintenance(&self, enabled: bool) {
        let result = sqlx::query("UPDATE agent_control SET maintenance_enabled = $1")
            .bind(enabled)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => info!("Maintenance flag set to {}", enabled),
            Err(e) => warn!("Failed to set maintenance flag: {}", e),
        }
    }
}
