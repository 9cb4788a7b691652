//! Drydock Agent - Entry Point
//!
//! Runs unattended on a host with access to the deployment tooling and
//! the shared job store. Claims one job at a time and drives it to a
//! terminal outcome.

use std::collections::HashMap;
use std::env;
use std::path::Path;

use drydock::app::options::AppOptions;
use drydock::app::run::run;
use drydock::logs::{init_logging, LogOptions};
use drydock::settings::Settings;
use drydock::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version).unwrap());
        return;
    }

    // Load settings
    let settings_path = cli_args.get("settings").map(Path::new);
    let settings = match Settings::load(settings_path).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to load settings: {}", e);
            return;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.json_logs,
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    // Run the agent
    let options = AppOptions::from_settings(settings);
    info!(
        "Running Drydock Agent (target {})",
        options.settings.target.as_str()
    );
    let result = run(version.version, options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the agent: {e}");
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
