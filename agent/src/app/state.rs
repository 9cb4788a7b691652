//! Application state shared with the agent worker

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::artifacts::ArtifactStore;
use crate::db::control::ControlStore;
use crate::db::jobs::JobStore;
use crate::db::models::TargetKind;
use crate::db::pool;
use crate::deploy::{executor_for, Executor};
use crate::errors::AgentError;
use crate::maintenance::MaintenanceGate;
use crate::notify::Mailer;
use crate::settings::Settings;

/// Main application state
pub struct AppState {
    /// Job store client
    pub jobs: JobStore,

    /// Artifact store client
    pub artifacts: ArtifactStore,

    /// Control row / admin contact client
    pub control: ControlStore,

    /// Deployment backend for this instance's target
    pub executor: Arc<dyn Executor>,

    /// Notification sink, absent when SMTP is unconfigured
    pub mailer: Option<Mailer>,

    /// Traffic gate toggled around deploys
    pub gate: MaintenanceGate,

    /// Target environment kind this instance drives
    pub target: TargetKind,

    /// Heartbeat interval for in-flight jobs
    pub heartbeat_interval: Duration,

    /// Id of the job currently executing, if any
    pub current_job: RwLock<Option<Uuid>>,
}

impl AppState {
    /// Initialize application state: connect to the store, pick the
    /// executor, and load the optional mailer configuration.
    pub async fn init(settings: &Settings) -> Result<Self, AgentError> {
        info!("Initializing application state...");

        let pool = pool::connect(&settings.database_url).await?;

        let jobs = JobStore::new(pool.clone());
        let artifacts = ArtifactStore::new(pool.clone());
        let control = ControlStore::new(pool);

        let executor = executor_for(settings);

        let mailer = match control.smtp_settings().await {
            Ok(Some(smtp)) => match Mailer::from_settings(&smtp) {
                Ok(mailer) => mailer,
                Err(e) => {
                    warn!("Mailer setup failed, notifications disabled: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("SMTP configuration load failed: {}", e);
                None
            }
        };

        Ok(Self {
            jobs,
            artifacts,
            control,
            executor,
            mailer,
            gate: MaintenanceGate::new(&settings.maintenance),
            target: settings.target,
            heartbeat_interval: Duration::from_secs(settings.heartbeat_interval_secs),
            current_job: RwLock::new(None),
        })
    }
}
