// Configuration for the autosave engine.
//
// File: `~/.autosave/config.toml` (or an explicit `--config` path).
// Environment: `AUTOSAVE_<KEY>` overrides any file value.
//
// The engine core never sees this type; it gets an `EngineConfig` of plain
// durations and counts.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::EngineConfig;

/// Root directory for autosave state: `~/.autosave/`.
pub fn autosave_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".autosave"))
}

/// Path to the config file: `~/.autosave/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    autosave_dir().map(|d| d.join("config.toml"))
}

/// Default host bridge endpoint: `~/.autosave/bridge.sock`.
pub fn default_bridge_socket() -> PathBuf {
    autosave_dir().unwrap_or_else(|| PathBuf::from(".autosave")).join("bridge.sock")
}

// ── Config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AutosaveConfig {
    /// Minimum seconds between two saves of the same document.
    pub debounce_seconds: f64,
    /// Seconds between full scans of the open documents.
    pub polling_interval: f64,
    /// Scan cadence while push notifications are unavailable.
    pub fallback_polling_interval: f64,
    /// Consecutive host failures before a reconnect attempt.
    pub reconnect_threshold: u32,
    /// Control loop quantum in seconds.
    pub main_loop_sleep: f64,
    /// Bound on each blocking host call.
    pub call_timeout_seconds: f64,
    /// Maximum distinct documents waiting in the push inbox.
    pub inbox_capacity: usize,
    /// Host bridge socket. Defaults to `~/.autosave/bridge.sock`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_socket: Option<PathBuf>,
    /// Rotate the log file once it would exceed this many bytes.
    pub log_max_size: u64,
    /// Rotated log files kept next to the live one.
    pub log_backup_count: u32,
    /// Directory for `autosave.log`; empty means the working directory.
    pub log_directory: PathBuf,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: 10.0,
            polling_interval: 15.0,
            fallback_polling_interval: 5.0,
            reconnect_threshold: 20,
            main_loop_sleep: 0.5,
            call_timeout_seconds: 10.0,
            inbox_capacity: 1024,
            bridge_socket: None,
            log_max_size: 5 * 1024 * 1024,
            log_backup_count: 3,
            log_directory: PathBuf::new(),
        }
    }
}

/// A config file plus whatever the environment changed.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AutosaveConfig,
    /// File that was read, if any existed.
    pub source: Option<PathBuf>,
    /// Environment overrides that could not be parsed and were ignored.
    pub warnings: Vec<String>,
}

impl AutosaveConfig {
    /// Load from `path` (or the default location), apply environment
    /// overrides and validate. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key))
    }

    /// Testable variant that accepts an environment lookup function.
    pub fn load_with_env<F>(path: Option<&Path>, env: F) -> Result<LoadedConfig, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        let (mut config, source) = match &path {
            Some(path) if path.exists() => (Self::load_from(path)?, Some(path.clone())),
            _ => (Self::default(), None),
        };
        let warnings = config.apply_env_fn(env);
        config.validate()?;
        Ok(LoadedConfig { config, source, warnings })
    }

    /// Parse a specific file, without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Apply `AUTOSAVE_<KEY>` overrides. Returns one warning per value that
    /// did not parse; those keys keep their previous value.
    pub fn apply_env_fn<F>(&mut self, env: F) -> Vec<String>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let mut warnings = Vec::new();
        let mut lookup = |key: &str| env(key).ok().filter(|value| !value.trim().is_empty());

        override_parsed(
            &mut lookup,
            "AUTOSAVE_DEBOUNCE_SECONDS",
            &mut self.debounce_seconds,
            &mut warnings,
        );
        override_parsed(
            &mut lookup,
            "AUTOSAVE_POLLING_INTERVAL",
            &mut self.polling_interval,
            &mut warnings,
        );
        override_parsed(
            &mut lookup,
            "AUTOSAVE_FALLBACK_POLLING_INTERVAL",
            &mut self.fallback_polling_interval,
            &mut warnings,
        );
        override_parsed(
            &mut lookup,
            "AUTOSAVE_RECONNECT_THRESHOLD",
            &mut self.reconnect_threshold,
            &mut warnings,
        );
        override_parsed(
            &mut lookup,
            "AUTOSAVE_MAIN_LOOP_SLEEP",
            &mut self.main_loop_sleep,
            &mut warnings,
        );
        override_parsed(
            &mut lookup,
            "AUTOSAVE_CALL_TIMEOUT_SECONDS",
            &mut self.call_timeout_seconds,
            &mut warnings,
        );
        override_parsed(
            &mut lookup,
            "AUTOSAVE_INBOX_CAPACITY",
            &mut self.inbox_capacity,
            &mut warnings,
        );
        override_parsed(
            &mut lookup,
            "AUTOSAVE_LOG_MAX_SIZE",
            &mut self.log_max_size,
            &mut warnings,
        );
        override_parsed(
            &mut lookup,
            "AUTOSAVE_LOG_BACKUP_COUNT",
            &mut self.log_backup_count,
            &mut warnings,
        );

        if let Some(socket) = lookup("AUTOSAVE_BRIDGE_SOCKET") {
            self.bridge_socket = Some(PathBuf::from(socket));
        }
        if let Some(dir) = lookup("AUTOSAVE_LOG_DIRECTORY") {
            self.log_directory = PathBuf::from(dir);
        }
        warnings
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive_seconds("debounce_seconds", self.debounce_seconds)?;
        positive_seconds("polling_interval", self.polling_interval)?;
        positive_seconds("fallback_polling_interval", self.fallback_polling_interval)?;
        positive_seconds("main_loop_sleep", self.main_loop_sleep)?;
        positive_seconds("call_timeout_seconds", self.call_timeout_seconds)?;
        if self.reconnect_threshold == 0 {
            return Err(ConfigError::Invalid {
                key: "reconnect_threshold",
                reason: "must be at least 1".into(),
            });
        }
        if self.inbox_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "inbox_capacity",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn bridge_socket_path(&self) -> PathBuf {
        self.bridge_socket.clone().unwrap_or_else(default_bridge_socket)
    }

    /// Plain values for the engine core.
    pub fn engine(&self) -> Result<EngineConfig, ConfigError> {
        self.validate()?;
        Ok(EngineConfig {
            debounce: Duration::from_secs_f64(self.debounce_seconds),
            polling_interval: Duration::from_secs_f64(self.polling_interval),
            fallback_polling_interval: Duration::from_secs_f64(self.fallback_polling_interval),
            reconnect_threshold: self.reconnect_threshold,
            main_loop_sleep: Duration::from_secs_f64(self.main_loop_sleep),
            call_timeout: Duration::from_secs_f64(self.call_timeout_seconds),
            inbox_capacity: self.inbox_capacity,
        })
    }
}

fn override_parsed<T, L>(lookup: &mut L, key: &str, slot: &mut T, warnings: &mut Vec<String>)
where
    T: FromStr,
    L: FnMut(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => warnings.push(format!("ignoring {key}={raw:?}: not a valid value")),
    }
}

fn positive_seconds(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= u32::MAX as f64 {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        key,
        reason: format!("must be a positive number of seconds, got {value}"),
    })
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[source] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[source] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[source] toml::ser::Error),
    #[error("invalid `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}
