//! Maintenance gate: flips the reverse proxy into 503 mode around deploys
//!
//! The proxy config is expected to check for a flag file:
//!
//! ```text
//! location / {
//!     if (-f /tmp/maintenance-mode) {
//!         return 503;
//!     }
//! }
//! ```
//!
//! Gate operations are idempotent and never fatal: a broken proxy reload
//! must not fail a deployment.

use std::path::PathBuf;

use tokio::process::Command;
use tracing::{info, warn};

use crate::settings::{GateMode, MaintenanceSettings};

/// Controls nginx/haproxy traffic during deployments
pub struct MaintenanceGate {
    mode: GateMode,
    flag_path: PathBuf,
}

impl MaintenanceGate {
    pub fn new(settings: &MaintenanceSettings) -> Self {
        Self {
            mode: settings.mode,
            flag_path: PathBuf::from(&settings.flag_path),
        }
    }

    /// Start returning 503 for incoming requests.
    pub async fn enable(&self) {
        if let Err(e) = tokio::fs::write(&self.flag_path, b"").await {
            warn!("Failed to create maintenance flag: {}", e);
            return;
        }
        self.reload_proxy().await;
        info!("Maintenance mode enabled ({:?})", self.mode);
    }

    /// Resume normal traffic.
    pub async fn disable(&self) {
        match tokio::fs::remove_file(&self.flag_path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove maintenance flag: {}", e);
                return;
            }
        }
        self.reload_proxy().await;
        info!("Maintenance mode disabled ({:?})", self.mode);
    }

    async fn reload_proxy(&self) {
        match self.mode {
            GateMode::Nginx => {
                let status = Command::new("nginx").args(["-s", "reload"]).status().await;
                match status {
                    Ok(status) if status.success() => {}
                    Ok(status) => warn!("nginx reload exited with {}", status),
                    Err(e) => warn!("nginx reload failed: {}", e),
                }
            }
            GateMode::Haproxy => {
                // haproxy setups watch the flag file; no reload needed.
            }
        }
    }
}
