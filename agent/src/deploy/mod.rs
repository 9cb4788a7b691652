//! Deployment executors
//!
//! One [`Executor`] implementation per target environment, selected once
//! at startup. Executors never return `Err`: every internal fault is
//! converted to a [`DeploymentResult`] failure so the agent loop always
//! receives a terminal outcome to record.

pub mod bundle;
pub mod compose;
pub mod helm;

use std::process::Output;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::db::models::{Artifact, TargetKind};
use crate::errors::AgentError;
use crate::settings::Settings;

/// Outcome status of one executor operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStatus {
    Success,
    Failure,
}

/// Result of a deploy or rollback operation; pure data owned by the caller
#[derive(Debug, Clone)]
pub struct DeploymentResult {
    pub status: DeployStatus,

    /// Helm revision number, when the target tracks one
    pub revision: Option<i64>,

    pub message: String,
    pub error: Option<String>,
}

impl DeploymentResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: DeployStatus::Success,
            revision: None,
            message: message.into(),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: DeployStatus::Failure,
            revision: None,
            message: message.into(),
            error: Some(error.into()),
        }
    }

    pub fn with_revision(mut self, revision: Option<i64>) -> Self {
        self.revision = revision;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == DeployStatus::Success
    }
}

/// A deployment backend for one target environment kind
#[async_trait]
pub trait Executor: Send + Sync {
    /// Target kind this executor drives
    fn target(&self) -> TargetKind;

    /// Apply an artifact to the target environment.
    async fn deploy(&self, artifact: &Artifact) -> DeploymentResult;

    /// Revert to the previous version.
    ///
    /// Helm uses its native revision history and ignores `previous`;
    /// Compose has no history and requires `previous` to be supplied.
    async fn rollback(
        &self,
        previous: Option<&Artifact>,
        target_revision: Option<i64>,
    ) -> DeploymentResult;
}

/// Build the executor configured for this instance.
pub fn executor_for(settings: &Settings) -> Arc<dyn Executor> {
    match settings.target {
        TargetKind::Helm => Arc::new(helm::HelmExecutor::new(settings.helm.clone())),
        TargetKind::Compose => Arc::new(compose::ComposeExecutor::new(settings.compose.clone())),
    }
}

/// Run an external tool with captured output under a hard timeout.
pub(crate) async fn run_tool(
    command: &mut Command,
    timeout: Duration,
) -> Result<Output, AgentError> {
    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| {
            AgentError::ExecutionError(format!("operation exceeded {:?}", timeout))
        })??;
    Ok(output)
}

pub(crate) fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

pub(crate) fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_constructors() {
        let ok = DeploymentResult::success("done").with_revision(Some(4));
        assert!(ok.is_success());
        assert_eq!(ok.revision, Some(4));
        assert!(ok.error.is_none());

        let failed = DeploymentResult::failure("upgrade failed", "exit 1");
        assert!(!failed.is_success());
        assert_eq!(failed.error.as_deref(), Some("exit 1"));
    }
}
