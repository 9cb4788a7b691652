//! Settings file management
//!
//! Settings are read from a JSON file with serde defaults so a minimal
//! file (or none at all) yields a runnable configuration. The database
//! DSN can always be overridden through the `DATABASE_URL` environment
//! variable, which is how production deployments inject credentials.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::db::models::TargetKind;
use crate::errors::AgentError;
use crate::logs::LogLevel;

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub json_logs: bool,

    /// Postgres connection string
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Deployment target driven by this instance
    #[serde(default)]
    pub target: TargetKind,

    /// Polling interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Heartbeat interval in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Helm target configuration
    #[serde(default)]
    pub helm: HelmSettings,

    /// Docker Compose target configuration
    #[serde(default)]
    pub compose: ComposeSettings,

    /// Maintenance gate configuration
    #[serde(default)]
    pub maintenance: MaintenanceSettings,
}

fn default_database_url() -> String {
    "postgresql://localhost:5432/drydock".to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_heartbeat_interval() -> u64 {
    60
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            database_url: default_database_url(),
            target: TargetKind::default(),
            poll_interval_secs: default_poll_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            helm: HelmSettings::default(),
            compose: ComposeSettings::default(),
            maintenance: MaintenanceSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults when the
    /// file is absent. `DATABASE_URL` overrides the file value.
    pub async fn load(path: Option<&Path>) -> Result<Self, AgentError> {
        let mut settings = match path {
            Some(path) if path.exists() => {
                let raw = tokio::fs::read_to_string(path).await?;
                serde_json::from_str(&raw)?
            }
            Some(path) => {
                return Err(AgentError::ConfigError(format!(
                    "settings file not found: {}",
                    path.display()
                )));
            }
            None => Settings::default(),
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                settings.database_url = url;
            }
        }

        Ok(settings)
    }
}

/// Helm target settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelmSettings {
    /// Kubernetes namespace
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Helm release name
    #[serde(default = "default_release_name")]
    pub release_name: String,

    /// Helm operation timeout passed to the CLI (helm duration syntax)
    #[serde(default = "default_helm_timeout")]
    pub timeout: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_release_name() -> String {
    "drydock".to_string()
}

fn default_helm_timeout() -> String {
    "10m".to_string()
}

impl Default for HelmSettings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            release_name: default_release_name(),
            timeout: default_helm_timeout(),
        }
    }
}

/// Docker Compose target settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeSettings {
    /// Compose project name
    #[serde(default = "default_project_name")]
    pub project_name: String,

    /// Working directory the bundle is staged into
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
}

fn default_project_name() -> String {
    "drydock".to_string()
}

fn default_working_dir() -> String {
    "/var/lib/drydock/compose".to_string()
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            working_dir: default_working_dir(),
        }
    }
}

/// Maintenance gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceSettings {
    /// Reverse proxy in front of the deployment ("nginx" or "haproxy")
    #[serde(default)]
    pub mode: GateMode,

    /// Flag file the proxy config checks to return 503
    #[serde(default = "default_flag_path")]
    pub flag_path: String,
}

fn default_flag_path() -> String {
    "/tmp/maintenance-mode".to_string()
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            mode: GateMode::default(),
            flag_path: default_flag_path(),
        }
    }
}

/// Supported reverse proxies for the maintenance gate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    #[default]
    Nginx,
    Haproxy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults_from_empty_json() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.poll_interval_secs, 30);
        assert_eq!(settings.heartbeat_interval_secs, 60);
        assert_eq!(settings.target, TargetKind::Helm);
        assert_eq!(settings.helm.timeout, "10m");
        assert_eq!(settings.compose.project_name, "drydock");
        assert_eq!(settings.maintenance.mode, GateMode::Nginx);
    }

    #[test]
    fn test_settings_parse_compose_target() {
        let raw = r#"{
            "target": "compose",
            "compose": { "project_name": "shop", "working_dir": "/srv/shop" },
            "maintenance": { "mode": "haproxy" }
        }"#;
        let settings: Settings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.target, TargetKind::Compose);
        assert_eq!(settings.compose.project_name, "shop");
        assert_eq!(settings.maintenance.mode, GateMode::Haproxy);
    }
}
