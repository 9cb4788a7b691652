//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::AgentError;
use crate::workers::agent;

/// Run the Drydock agent
pub async fn run(
    agent_version: String,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AgentError> {
    info!("Initializing Drydock Agent {}...", agent_version);

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(options.lifecycle.clone());

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start agent: {}", e);
        shutdown_manager.shutdown(&shutdown_tx).await?;
        return Err(e);
    }

    tokio::select! {
        _ = shutdown_signal => {
            info!("Shutdown signal received, shutting down...");
        }
    }

    // Shutdown
    let result = shutdown_manager.shutdown(&shutdown_tx).await;
    drop(shutdown_tx);
    result
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), AgentError> {
    let app_state = Arc::new(AppState::init(&options.settings).await?);

    init_agent_worker(
        options.agent_worker.clone(),
        app_state,
        shutdown_manager,
        shutdown_tx.subscribe(),
    )
    .await?;

    Ok(())
}

async fn init_agent_worker(
    options: agent::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AgentError> {
    info!("Initializing agent worker...");

    let agent_handle = tokio::spawn(async move {
        agent::run(
            &options,
            app_state,
            |wait| tokio::time::sleep(wait),
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_agent_worker_handle(agent_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    lifecycle_options: LifecycleOptions,
    agent_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(lifecycle_options: LifecycleOptions) -> Self {
        Self {
            lifecycle_options,
            agent_worker_handle: None,
        }
    }

    pub fn with_agent_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), AgentError> {
        if self.agent_worker_handle.is_some() {
            return Err(AgentError::ShutdownError("agent_handle already set".to_string()));
        }
        self.agent_worker_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self, shutdown_tx: &broadcast::Sender<()>) -> Result<(), AgentError> {
        let _ = shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), AgentError> {
        info!("Shutting down Drydock Agent...");

        // The worker finishes its in-flight job before observing the
        // signal; waiting here is what keeps jobs from being abandoned
        // mid-operation.
        if let Some(handle) = self.agent_worker_handle.take() {
            handle
                .await
                .map_err(|e| AgentError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
