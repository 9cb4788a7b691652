//! Helm executor for Kubernetes targets

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::db::models::{Artifact, TargetKind};
use crate::deploy::bundle::{self, Staging};
use crate::deploy::{run_tool, stderr_text, stdout_text, DeploymentResult, Executor};
use crate::errors::AgentError;
use crate::settings::HelmSettings;

// Process timeouts sit above the helm-side --timeout so the tool gets
// to report its own failure before we give up on it.
const DEPLOY_TIMEOUT: Duration = Duration::from_secs(660);
const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(660);
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives `helm upgrade` / `helm rollback` against one release
pub struct HelmExecutor {
    settings: HelmSettings,
}

impl HelmExecutor {
    pub fn new(settings: HelmSettings) -> Self {
        info!(
            "Helm executor initialized (namespace {}, release {}, timeout {})",
            settings.namespace, settings.release_name, settings.timeout
        );
        Self { settings }
    }

    async fn upgrade(&self, artifact: &Artifact) -> Result<DeploymentResult, AgentError> {
        bundle::verify_digest(artifact)?;

        let staging = Staging::create("drydock-deploy-")?;
        let result = self.upgrade_staged(&staging, artifact).await;
        staging.purge().await;
        result
    }

    async fn upgrade_staged(
        &self,
        staging: &Staging,
        artifact: &Artifact,
    ) -> Result<DeploymentResult, AgentError> {
        let tarball = staging.write_payload(&artifact.payload).await?;
        bundle::extract_tar_gz(&tarball, staging.path()).await?;

        let chart_path = locate_chart(staging.path()).await?;
        info!("Chart path resolved to {}", chart_path.display());

        let values_path = match &artifact.values_overlay {
            Some(values) => {
                let path = staging.path().join("values.yaml");
                tokio::fs::write(&path, values).await?;
                Some(path)
            }
            None => None,
        };

        let mut cmd = Command::new("helm");
        cmd.arg("upgrade")
            .arg(&self.settings.release_name)
            .arg(&chart_path)
            .arg("--install")
            .args(["--namespace", &self.settings.namespace])
            .arg("--create-namespace")
            .args(["--timeout", &self.settings.timeout])
            .arg("--atomic")
            .arg("--wait")
            .args(["--output", "json"]);
        if let Some(values) = &values_path {
            cmd.arg("--values").arg(values);
        }

        info!(
            "Running helm upgrade for release {} (version {})",
            self.settings.release_name, artifact.version
        );
        let output = run_tool(&mut cmd, DEPLOY_TIMEOUT).await?;

        if !output.status.success() {
            let stderr = stderr_text(&output);
            error!("helm upgrade failed: {}", stderr);
            return Ok(DeploymentResult::failure("Helm upgrade failed", stderr));
        }

        let revision = match parse_upgrade_revision(&stdout_text(&output)) {
            Some(revision) => Some(revision),
            None => {
                warn!("helm upgrade output not parseable, querying revision");
                self.current_revision().await
            }
        };

        info!(
            "helm upgrade succeeded (revision {:?}, release {})",
            revision, self.settings.release_name
        );
        Ok(DeploymentResult::success(format!(
            "Helm upgrade completed successfully (revision {})",
            revision.map_or_else(|| "unknown".to_string(), |r| r.to_string())
        ))
        .with_revision(revision))
    }

    async fn run_rollback(&self, target_revision: Option<i64>) -> Result<DeploymentResult, AgentError> {
        let mut cmd = Command::new("helm");
        cmd.arg("rollback")
            .arg(&self.settings.release_name)
            .args(["--namespace", &self.settings.namespace])
            .args(["--timeout", &self.settings.timeout])
            .arg("--wait");
        if let Some(revision) = target_revision {
            cmd.arg(revision.to_string());
        }

        info!(
            "Running helm rollback for release {} (target revision {:?})",
            self.settings.release_name, target_revision
        );
        let output = run_tool(&mut cmd, ROLLBACK_TIMEOUT).await?;

        if !output.status.success() {
            let stderr = stderr_text(&output);
            error!("helm rollback failed: {}", stderr);
            return Ok(DeploymentResult::failure("Helm rollback failed", stderr));
        }

        let revision = self.current_revision().await;
        info!("helm rollback succeeded (revision {:?})", revision);
        Ok(DeploymentResult::success(format!(
            "Helm rollback completed (revision {})",
            revision.map_or_else(|| "unknown".to_string(), |r| r.to_string())
        ))
        .with_revision(revision))
    }

    /// Query the deployed revision of the release via `helm list`.
    async fn current_revision(&self) -> Option<i64> {
        let mut cmd = Command::new("helm");
        cmd.arg("list")
            .args(["-n", &self.settings.namespace])
            .args(["-f", &self.settings.release_name])
            .args(["-o", "json"]);

        match run_tool(&mut cmd, QUERY_TIMEOUT).await {
            Ok(output) if output.status.success() => {
                parse_list_revision(&stdout_text(&output))
            }
            Ok(output) => {
                warn!("helm list failed: {}", stderr_text(&output));
                None
            }
            Err(e) => {
                warn!("helm list error: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl Executor for HelmExecutor {
    fn target(&self) -> TargetKind {
        TargetKind::Helm
    }

    async fn deploy(&self, artifact: &Artifact) -> DeploymentResult {
        match self.upgrade(artifact).await {
            Ok(result) => result,
            Err(e) => {
                error!("helm deploy fault: {}", e);
                DeploymentResult::failure("Helm upgrade failed", e.to_string())
            }
        }
    }

    async fn rollback(
        &self,
        _previous: Option<&Artifact>,
        target_revision: Option<i64>,
    ) -> DeploymentResult {
        match self.run_rollback(target_revision).await {
            Ok(result) => result,
            Err(e) => {
                error!("helm rollback fault: {}", e);
                DeploymentResult::failure("Helm rollback failed", e.to_string())
            }
        }
    }
}

/// Find the chart inside an extracted bundle: a `chart/` subdirectory,
/// else any subdirectory containing `Chart.yaml`, else the bundle root.
async fn locate_chart(root: &Path) -> Result<PathBuf, AgentError> {
    let preferred = root.join("chart");
    if tokio::fs::try_exists(&preferred).await.unwrap_or(false) {
        return Ok(preferred);
    }

    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_dir() && tokio::fs::try_exists(path.join("Chart.yaml")).await.unwrap_or(false) {
            return Ok(path);
        }
    }

    Ok(root.to_path_buf())
}

/// Revision from `helm upgrade -o json` output.
fn parse_upgrade_revision(stdout: &str) -> Option<i64> {
    let value: serde_json::Value = serde_json::from_str(stdout).ok()?;
    value.get("version")?.as_i64()
}

/// Revision from `helm list -o json` output (array of releases).
fn parse_list_revision(stdout: &str) -> Option<i64> {
    let value: serde_json::Value = serde_json::from_str(stdout).ok()?;
    let release = value.as_array()?.first()?;
    match release.get("revision")? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upgrade_revision() {
        let stdout = r#"{"name":"shop","version":7,"info":{"status":"deployed"}}"#;
        assert_eq!(parse_upgrade_revision(stdout), Some(7));
        assert_eq!(parse_upgrade_revision("not json"), None);
        assert_eq!(parse_upgrade_revision("{}"), None);
    }

    #[test]
    fn test_parse_list_revision() {
        let stdout = r#"[{"name":"shop","revision":"3","status":"deployed"}]"#;
        assert_eq!(parse_list_revision(stdout), Some(3));

        let numeric = r#"[{"name":"shop","revision":4}]"#;
        assert_eq!(parse_list_revision(numeric), Some(4));

        assert_eq!(parse_list_revision("[]"), None);
    }
}
