//! Docker Compose executor for compose-host targets

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::db::models::{Artifact, TargetKind};
use crate::deploy::bundle::{self, Staging};
use crate::deploy::{run_tool, stderr_text, DeploymentResult, Executor};
use crate::errors::AgentError;
use crate::settings::ComposeSettings;

const PULL_TIMEOUT: Duration = Duration::from_secs(600);
const UP_TIMEOUT: Duration = Duration::from_secs(300);

/// Drives `docker compose pull` / `up` against one project
pub struct ComposeExecutor {
    settings: ComposeSettings,
}

impl ComposeExecutor {
    pub fn new(settings: ComposeSettings) -> Self {
        info!(
            "Compose executor initialized (project {}, workdir {})",
            settings.project_name, settings.working_dir
        );
        Self { settings }
    }

    async fn bring_up(&self, artifact: &Artifact) -> Result<DeploymentResult, AgentError> {
        bundle::verify_digest(artifact)?;

        // The tarball is staged in a scratch dir that gets wiped; the
        // extracted tree lands in the persistent working directory the
        // compose project runs from.
        let staging = Staging::create("drydock-compose-")?;
        let result = self.bring_up_staged(&staging, artifact).await;
        staging.purge().await;
        result
    }

    async fn bring_up_staged(
        &self,
        staging: &Staging,
        artifact: &Artifact,
    ) -> Result<DeploymentResult, AgentError> {
        let workdir = PathBuf::from(&self.settings.working_dir);
        tokio::fs::create_dir_all(&workdir).await?;

        let tarball = staging.write_payload(&artifact.payload).await?;
        bundle::extract_tar_gz(&tarball, &workdir).await?;

        if let Some(env) = &artifact.env_overlay {
            let env_path = workdir.join(".env");
            tokio::fs::write(&env_path, env).await?;
            info!("Wrote environment overlay to {}", env_path.display());
        }

        let compose_file = match self.locate_compose_file(&workdir).await {
            Some(path) => path,
            None => {
                return Ok(DeploymentResult::failure(
                    "docker-compose.yaml not found in bundle",
                    format!("no docker-compose file in {}", workdir.display()),
                ));
            }
        };

        // Pull failures are non-fatal: cached images that already exist
        // legitimately warn here.
        info!("Pulling images for project {}", self.settings.project_name);
        let mut pull = Command::new("docker");
        pull.current_dir(&workdir)
            .args(["compose", "-f"])
            .arg(&compose_file)
            .arg("pull");
        match run_tool(&mut pull, PULL_TIMEOUT).await {
            Ok(output) if !output.status.success() => {
                warn!("docker compose pull warning: {}", stderr_text(&output));
            }
            Ok(_) => {}
            Err(e) => warn!("docker compose pull error: {}", e),
        }

        info!("Bringing up project {}", self.settings.project_name);
        let mut up = Command::new("docker");
        up.current_dir(&workdir)
            .args(["compose", "-f"])
            .arg(&compose_file)
            .args(["-p", &self.settings.project_name])
            .args(["up", "-d", "--remove-orphans"]);
        let output = run_tool(&mut up, UP_TIMEOUT).await?;

        if !output.status.success() {
            let stderr = stderr_text(&output);
            error!("docker compose up failed: {}", stderr);
            return Ok(DeploymentResult::failure(
                "Docker Compose deployment failed",
                stderr,
            ));
        }

        info!("Compose deployment succeeded (version {})", artifact.version);
        Ok(DeploymentResult::success(
            "Docker Compose deployment completed successfully",
        ))
    }

    async fn locate_compose_file(&self, workdir: &std::path::Path) -> Option<PathBuf> {
        for name in ["docker-compose.yaml", "docker-compose.yml"] {
            let candidate = workdir.join(name);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Some(candidate);
            }
        }
        None
    }
}

#[async_trait]
impl Executor for ComposeExecutor {
    fn target(&self) -> TargetKind {
        TargetKind::Compose
    }

    async fn deploy(&self, artifact: &Artifact) -> DeploymentResult {
        match self.bring_up(artifact).await {
            Ok(result) => result,
            Err(e) => {
                error!("compose deploy fault: {}", e);
                DeploymentResult::failure("Docker Compose deployment failed", e.to_string())
            }
        }
    }

    /// Compose has no native revision history: rollback re-deploys the
    /// previous artifact. Without one, fail immediately before any tool
    /// invocation; there is nothing to retry against.
    async fn rollback(
        &self,
        previous: Option<&Artifact>,
        _target_revision: Option<i64>,
    ) -> DeploymentResult {
        let Some(previous) = previous else {
            return DeploymentResult::failure(
                "Rollback failed",
                "no previous version available for rollback on this compose host",
            );
        };

        info!("Rolling back to version {}", previous.version);
        let result = self.deploy(previous).await;
        if result.is_success() {
            DeploymentResult::success(format!("Rolled back to {}", previous.version))
        } else {
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rollback_without_previous_fails_fast() {
        let executor = ComposeExecutor::new(ComposeSettings::default());
        let result = executor.rollback(None, None).await;

        assert!(!result.is_success());
        assert!(result
            .error
            .as_deref()
            .unwrap()
            .contains("no previous version"));
    }
}
