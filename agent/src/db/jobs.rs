//! Job store client: atomic claim and terminal status writes

use sqlx::postgres::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::models::{Job, JobReport};
use crate::errors::AgentError;

const CLAIM_SQL: &str = r#"
    UPDATE deployment_job
    SET status = 'inProgress',
        picked_up_at = NOW(),
        updated_at = NOW()
    WHERE id = (
        SELECT id FROM deployment_job
        WHERE status = 'pending'
        AND execute_after <= NOW()
        ORDER BY execute_after ASC, id ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
    )
    RETURNING id, kind, status, artifact_id, execute_after, picked_up_at,
              completed_at, last_heartbeat, result, error_message,
              created_at, updated_at
"#;

// Terminal writes each clear the other outcome column, so a repeated or
// overwriting call can never leave a row with both a failure status and
// a success report (or the reverse).
const COMPLETE_SQL: &str = r#"
    UPDATE deployment_job
    SET status = 'completed',
        completed_at = NOW(),
        result = $2,
        error_message = NULL,
        updated_at = NOW()
    WHERE id = $1
"#;

const FAIL_SQL: &str = r#"
    UPDATE deployment_job
    SET status = 'failed',
        completed_at = NOW(),
        error_message = $2,
        result = NULL,
        updated_at = NOW()
    WHERE id = $1
"#;

/// Client for the `deployment_job` table
#[derive(Clone)]
pub struct JobStore {
    pool: PgPool,
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Atomically claim the single due job with the earliest
    /// `execute_after`, transitioning it to InProgress.
    ///
    /// The inner select uses `FOR UPDATE SKIP LOCKED` so a concurrent
    /// poller's attempt sees no eligible row instead of blocking or
    /// double-claiming. Ties on `execute_after` break by id.
    pub async fn claim(&self) -> Result<Option<Job>, AgentError> {
        let job = sqlx::query_as::<_, Job>(CLAIM_SQL)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AgentError::ClaimError(e.to_string()))?;

        if let Some(job) = &job {
            info!("Claimed job {} ({})", job.id, job.kind.as_str());
        }
        Ok(job)
    }

    /// Mark a job Completed with its structured outcome.
    ///
    /// Idempotent: a repeat call overwrites the same terminal row.
    pub async fn complete(&self, job_id: Uuid, report: &JobReport) -> Result<(), AgentError> {
        let result = serde_json::to_value(report)?;
        sqlx::query(COMPLETE_SQL)
            .bind(job_id)
            .bind(result)
            .execute(&self.pool)
            .await?;

        info!("Job {} completed", job_id);
        Ok(())
    }

    /// Mark a job Failed with a human-readable message.
    ///
    /// Idempotent like [`complete`](Self::complete).
    pub async fn fail(&self, job_id: Uuid, error: &str) -> Result<(), AgentError> {
        sqlx::query(FAIL_SQL)
            .bind(job_id)
            .bind(error)
            .execute(&self.pool)
            .await?;

        info!("Job {} failed: {}", job_id, error);
        Ok(())
    }

    /// Advance the liveness timestamp without touching status.
    pub async fn heartbeat(&self, job_id: Uuid) -> Result<(), AgentError> {
        let result = sqlx::query(
            "UPDATE deployment_job SET last_heartbeat = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!("Heartbeat for unknown job {}", job_id);
        } else {
            debug!("Heartbeat recorded for job {}", job_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_writes_clear_the_other_outcome_column() {
        // A failed row must not keep an earlier success report, and a
        // completed row must not keep an earlier error message.
        assert!(FAIL_SQL.contains("result = NULL"));
        assert!(COMPLETE_SQL.contains("error_message = NULL"));
    }

    #[test]
    fn test_claim_skips_locked_rows() {
        assert!(CLAIM_SQL.contains("FOR UPDATE SKIP LOCKED"));
        assert!(CLAIM_SQL.contains("execute_after <= NOW()"));
    }
}
