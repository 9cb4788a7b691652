//! Application configuration options

use std::time::Duration;

use crate::settings::Settings;
use crate::workers::agent;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Resolved settings (store DSN, target, executor config)
    pub settings: Settings,

    /// Agent worker options
    pub agent_worker: agent::Options,
}

impl AppOptions {
    pub fn from_settings(settings: Settings) -> Self {
        let agent_worker = agent::Options {
            interval: Duration::from_secs(settings.poll_interval_secs),
        };
        Self {
            lifecycle: LifecycleOptions::default(),
            settings,
            agent_worker,
        }
    }
}

/// Lifecycle options for the agent
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    ///
    /// Generous on purpose: an in-flight deploy is allowed to reach a
    /// terminal status before the process exits.
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(720),
        }
    }
}
