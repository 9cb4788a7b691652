//! Agent worker: poll, claim, execute, finalize
//!
//! One sequential loop. A shutdown signal is only honored between
//! cycles, so a job that reached Executing always ends Completed or
//! Failed before the process exits.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::app::state::AppState;
use crate::db::models::{Job, JobKind, JobReport};
use crate::errors::AgentError;
use crate::workers::heartbeat::HeartbeatMonitor;

/// Agent worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Run the agent worker
pub async fn run<S, F>(
    options: &Options,
    state: Arc<AppState>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Agent worker starting...");

    loop {
        // Check for shutdown
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Agent worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with poll
            }
        }

        poll_once(&state).await;
    }
}

/// One cycle: stamp liveness, try to claim, execute if claimed.
async fn poll_once(state: &AppState) {
    state.control.record_poll().await;

    let job = match state.jobs.claim().await {
        Ok(Some(job)) => job,
        Ok(None) => {
            debug!("No pending jobs");
            return;
        }
        Err(e) => {
            // Store unreachable; the next cycle retries.
            error!("Failed to claim a job: {}", e);
            return;
        }
    };

    execute_job(state, job).await;
}

async fn execute_job(state: &AppState, job: Job) {
    info!("Executing job {} ({})", job.id, job.kind.as_str());
    *state.current_job.write().await = Some(job.id);

    // Version label fetched up front so failure notifications can name
    // the release even when execution never got that far.
    let release_version = prefetch_version(state, &job).await;

    let mut monitor = HeartbeatMonitor::start(
        Arc::new(state.jobs.clone()),
        job.id,
        state.heartbeat_interval,
    );

    let outcome = match job.kind {
        JobKind::Deploy => run_deploy(state, &job).await,
        JobKind::Rollback => run_rollback(state, &job).await,
    };

    // Heartbeat stops before the terminal write, unconditionally.
    monitor.stop().await;

    finalize(state, &job, release_version, outcome).await;
    *state.current_job.write().await = None;
}

/// Deploy path: load artifact, gate traffic, dispatch, promote.
async fn run_deploy(state: &AppState, job: &Job) -> Result<JobReport, AgentError> {
    let artifact_id = job
        .artifact_id
        .ok_or_else(|| AgentError::ExecutionError("deploy job has no artifact reference".to_string()))?;

    let artifact = state
        .artifacts
        .get(artifact_id)
        .await?
        .ok_or_else(|| AgentError::NotFound(format!("artifact {}", artifact_id)))?;

    if artifact.target_kind != state.target {
        return Err(AgentError::ExecutionError(format!(
            "artifact {} targets {}, this instance drives {}",
            artifact.id,
            artifact.target_kind.as_str(),
            state.target.as_str()
        )));
    }

    state.gate.enable().await;
    state.control.set_maintenance(true).await;

    let result = state.executor.deploy(&artifact).await;

    state.gate.disable().await;
    state.control.set_maintenance(false).await;

    if !result.is_success() {
        let detail = result.error.unwrap_or(result.message);
        return Err(AgentError::ExecutionError(detail));
    }

    // Bookkeeping failure after a successful deploy still fails the
    // job: a half-promoted flag set would make rollback targeting
    // ambiguous.
    let old_current = state
        .artifacts
        .current_id(state.target)
        .await
        .map_err(|e| AgentError::BookkeepingError(e.to_string()))?
        .filter(|id| *id != artifact.id);

    state
        .artifacts
        .promote(artifact.id, old_current, state.target)
        .await?;

    Ok(JobReport {
        status: "success".to_string(),
        message: result.message,
        release_version: Some(artifact.version),
        revision: result.revision,
        error: None,
    })
}

/// Rollback path: look up the previous artifact and dispatch. Version
/// flags are left untouched; only a successful deploy promotes.
async fn run_rollback(state: &AppState, _job: &Job) -> Result<JobReport, AgentError> {
    let previous = state.artifacts.previous(state.target).await?;
    let previous_version = previous.as_ref().map(|p| p.version.clone());

    let result = state.executor.rollback(previous.as_ref(), None).await;

    if !result.is_success() {
        let detail = result.error.unwrap_or(result.message);
        return Err(AgentError::ExecutionError(detail));
    }

    Ok(JobReport {
        status: "success".to_string(),
        message: result.message,
        release_version: previous_version,
        revision: result.revision,
        error: None,
    })
}

/// Record the terminal outcome and send the best-effort notification.
async fn finalize(
    state: &AppState,
    job: &Job,
    release_version: String,
    outcome: Result<JobReport, AgentError>,
) {
    match outcome {
        Ok(report) => {
            if let Err(e) = state.jobs.complete(job.id, &report).await {
                error!("Failed to record completion for job {}: {}", job.id, e);
            }
            let version = report.release_version.as_deref().unwrap_or(&release_version);
            let status = match job.kind {
                JobKind::Deploy => "SUCCESS",
                JobKind::Rollback => "ROLLBACK_SUCCESS",
            };
            notify(state, status, version, None, job).await;
        }
        Err(e) => {
            error!("Job {} failed: {}", job.id, e);
            if let Err(write_err) = state.jobs.fail(job.id, &e.to_string()).await {
                error!(
                    "Failed to record failure for job {}: {}",
                    job.id, write_err
                );
            }
            let status = match job.kind {
                JobKind::Deploy => "FAILED",
                JobKind::Rollback => "ROLLBACK_FAILED",
            };
            notify(state, status, &release_version, Some(&e.to_string()), job).await;
        }
    }
}

async fn notify(
    state: &AppState,
    status: &str,
    release_version: &str,
    error_message: Option<&str>,
    job: &Job,
) {
    let Some(mailer) = &state.mailer else {
        return;
    };

    let admins = match state.control.active_admins().await {
        Ok(admins) => admins,
        Err(e) => {
            warn!("Failed to fetch notification recipients: {}", e);
            return;
        }
    };
    let recipients: Vec<String> = admins.into_iter().map(|a| a.email).collect();

    if let Err(e) = mailer
        .send_job_notification(&recipients, status, release_version, error_message, job.id)
        .await
    {
        error!("Notification failed: {}", e);
    }
}

async fn prefetch_version(state: &AppState, job: &Job) -> String {
    if job.kind == JobKind::Deploy {
        if let Some(artifact_id) = job.artifact_id {
            if let Ok(Some(version)) = state.artifacts.version_label(artifact_id).await {
                return version;
            }
        }
    }
    "unknown".to_string()
}
