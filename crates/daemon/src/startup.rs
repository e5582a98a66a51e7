// Service startup: logging, banner, host connector and the stop signal.

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::{AutosaveConfig, LoadedConfig};
use crate::host::bridge::BridgeConnector;
use crate::logging::{init_logging, LogSettings};
use crate::runtime::{Orchestrator, RunSummary};

/// Human-readable summary of the effective settings, logged at startup.
pub fn banner(config: &AutosaveConfig) -> Vec<String> {
    vec![
        format!("autosave {}", env!("CARGO_PKG_VERSION")),
        format!("  debounce:          {}s", config.debounce_seconds),
        format!(
            "  polling interval:  {}s ({}s without push notifications)",
            config.polling_interval,
            config.polling_interval.min(config.fallback_polling_interval)
        ),
        format!("  reconnect after:   {} consecutive failures", config.reconnect_threshold),
        format!("  host bridge:       {}", config.bridge_socket_path().display()),
    ]
}

pub fn log_settings(config: &AutosaveConfig) -> LogSettings {
    LogSettings {
        directory: config.log_directory.clone(),
        max_size: config.log_max_size,
        backup_count: config.log_backup_count,
    }
}

/// Run the engine against the host bridge until Ctrl-C.
pub async fn run_service(loaded: LoadedConfig) -> Result<RunSummary> {
    let LoadedConfig { config, source, warnings } = loaded;
    let log_file = init_logging(&log_settings(&config))?;

    for line in banner(&config) {
        info!("{line}");
    }
    match &source {
        Some(path) => info!(path = %path.display(), "loaded config"),
        None => info!("no config file, using defaults"),
    }
    info!(path = %log_file.display(), "logging to file");
    for warning in warnings {
        warn!("{warning}");
    }

    let engine_config = config.engine().context("invalid configuration")?;
    let connector = BridgeConnector::new(config.bridge_socket_path(), engine_config.call_timeout);
    let mut engine = Orchestrator::new(connector, engine_config);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("stop requested");
        let _ = shutdown_tx.send(());
    });

    Ok(engine.run(shutdown_rx).await)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn banner_shows_effective_cadences() {
        let config = AutosaveConfig {
            bridge_socket: Some(PathBuf::from("/run/bridge.sock")),
            ..AutosaveConfig::default()
        };
        let lines = banner(&config);
        assert!(lines[0].starts_with("autosave "));
        assert!(lines.iter().any(|l| l.contains("15s (5s without push notifications)")));
        assert!(lines.iter().any(|l| l.contains("/run/bridge.sock")));
    }

    #[test]
    fn log_settings_follow_config() {
        let config = AutosaveConfig { log_backup_count: 7, ..AutosaveConfig::default() };
        let settings = log_settings(&config);
        assert_eq!(settings.backup_count, 7);
        assert_eq!(settings.max_size, 5 * 1024 * 1024);
    }
}
