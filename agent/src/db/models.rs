//! Database row models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of work a job represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Deploy,
    Rollback,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Deploy => "deploy",
            JobKind::Rollback => "rollback",
        }
    }
}

impl TryFrom<String> for JobKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "deploy" => Ok(JobKind::Deploy),
            "rollback" => Ok(JobKind::Rollback),
            other => Err(format!("unknown job kind: {}", other)),
        }
    }
}

/// Job lifecycle status
///
/// Transitions are strictly Pending -> InProgress -> Completed | Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "inProgress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "inProgress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl TryFrom<String> for JobStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(JobStatus::Pending),
            "inProgress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Target environment kind an artifact deploys to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Helm,
    Compose,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Helm => "helm",
            TargetKind::Compose => "compose",
        }
    }
}

impl TryFrom<String> for TargetKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "helm" => Ok(TargetKind::Helm),
            "compose" => Ok(TargetKind::Compose),
            other => Err(format!("unknown target kind: {}", other)),
        }
    }
}

/// One deploy or rollback work item from the `deployment_job` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,

    #[sqlx(try_from = "String")]
    pub kind: JobKind,

    #[sqlx(try_from = "String")]
    pub status: JobStatus,

    /// Artifact reference, set for Deploy jobs
    pub artifact_id: Option<Uuid>,

    /// Not-before timestamp; the job is due once this has passed
    pub execute_after: DateTime<Utc>,

    pub picked_up_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,

    /// Opaque structured outcome written on completion
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable deployable bundle from the `release_artifact` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Artifact {
    pub id: Uuid,

    /// Human-facing version label
    pub version: String,

    #[sqlx(try_from = "String")]
    pub target_kind: TargetKind,

    /// tar.gz bundle bytes
    pub payload: Vec<u8>,

    /// `.env` content for Compose targets
    pub env_overlay: Option<String>,

    /// `values.yaml` content for Helm targets
    pub values_overlay: Option<String>,

    /// Hex sha256 of `payload`
    pub sha256: String,

    pub is_current: bool,
    pub is_previous: bool,
    pub applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Notification recipient from the `admin_contact` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdminContact {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub is_active: bool,
}

/// SMTP configuration read from the `agent_control` row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SmtpSettings {
    pub smtp_host: Option<String>,
    pub smtp_port: Option<i32>,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
}

/// Structured outcome serialized into `deployment_job.result`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub status: String,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::InProgress,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let parsed = JobStatus::try_from(status.as_str().to_string()).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(JobKind::try_from("restart".to_string()).is_err());
    }

    #[test]
    fn test_job_report_skips_empty_fields() {
        let report = JobReport {
            status: "success".to_string(),
            message: "done".to_string(),
            release_version: Some("v2".to_string()),
            revision: None,
            error: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("revision").is_none());
        assert!(json.get("error").is_none());
        assert_eq!(json["release_version"], "v2");
    }
}
