//! Artifact store client and current/previous version bookkeeping

use sqlx::postgres::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::models::{Artifact, TargetKind};
use crate::errors::AgentError;

const ARTIFACT_COLUMNS: &str = "id, version, target_kind, payload, env_overlay, \
     values_overlay, sha256, is_current, is_previous, applied_at, created_at";

/// Client for the `release_artifact` table
#[derive(Clone)]
pub struct ArtifactStore {
    pool: PgPool,
}

impl ArtifactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch an artifact with its payload bytes.
    pub async fn get(&self, artifact_id: Uuid) -> Result<Option<Artifact>, AgentError> {
        let sql = format!("SELECT {} FROM release_artifact WHERE id = $1", ARTIFACT_COLUMNS);
        let artifact = sqlx::query_as::<_, Artifact>(&sql)
            .bind(artifact_id)
            .fetch_optional(&self.pool)
            .await?;

        match &artifact {
            Some(a) => info!(
                "Loaded artifact {} (version {}, {} bytes)",
                a.id,
                a.version,
                a.payload.len()
            ),
            None => warn!("Artifact {} not found", artifact_id),
        }
        Ok(artifact)
    }

    /// Version label only, without pulling the payload bytes.
    pub async fn version_label(&self, artifact_id: Uuid) -> Result<Option<String>, AgentError> {
        let version: Option<String> =
            sqlx::query_scalar("SELECT version FROM release_artifact WHERE id = $1")
                .bind(artifact_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(version)
    }

    /// Id of the artifact currently flagged `is_current` for a target.
    pub async fn current_id(&self, target: TargetKind) -> Result<Option<Uuid>, AgentError> {
        let id: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM release_artifact WHERE is_current = TRUE AND target_kind = $1 LIMIT 1",
        )
        .bind(target.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    /// The artifact flagged `is_previous` for a target, used as the
    /// rollback source.
    pub async fn previous(&self, target: TargetKind) -> Result<Option<Artifact>, AgentError> {
        let sql = format!(
            "SELECT {} FROM release_artifact WHERE is_previous = TRUE AND target_kind = $1 LIMIT 1",
            ARTIFACT_COLUMNS
        );
        let artifact = sqlx::query_as::<_, Artifact>(&sql)
            .bind(target.as_str())
            .fetch_optional(&self.pool)
            .await?;

        if artifact.is_none() {
            warn!("No previous artifact recorded for {}", target.as_str());
        }
        Ok(artifact)
    }

    /// Promote an artifact to current after a successful deploy.
    ///
    /// One transaction: clear both flags for the target kind, mark the
    /// old current (if any) previous, mark the new one current. Keeps
    /// the invariant of at most one current and one previous per target.
    pub async fn promote(
        &self,
        new_current: Uuid,
        old_current: Option<Uuid>,
        target: TargetKind,
    ) -> Result<(), AgentError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AgentError::BookkeepingError(e.to_string()))?;

        sqlx::query(
            "UPDATE release_artifact SET is_current = FALSE, is_previous = FALSE WHERE target_kind = $1",
        )
        .bind(target.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| AgentError::BookkeepingError(e.to_string()))?;

        if let Some(old_id) = old_current {
            sqlx::query("UPDATE release_artifact SET is_previous = TRUE WHERE id = $1")
                .bind(old_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| AgentError::BookkeepingError(e.to_string()))?;
        }

        sqlx::query(
            r#"
            UPDATE release_artifact
            SET is_current = TRUE,
                is_previous = FALSE,
                applied_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(new_current)
        .execute(&mut *tx)
        .await
        .map_err(|e| AgentError::BookkeepingError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AgentError::BookkeepingError(e.to_string()))?;

        info!(
            "Promoted artifact {} to current ({}), previous: {:?}",
            new_current,
            target.as_str(),
            old_current
        );
        Ok(())
    }
}
