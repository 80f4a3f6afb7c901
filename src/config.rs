// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Runtime configuration for a bench control process.
//!
//! Values come from a TOML file when one is available and are then
//! overridden by `BANC_*` environment variables. Every key is optional; the
//! defaults match the bench installation (local broker, `data/` root, four
//! benches, fifteen cells).

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "banc.toml";

/// Errors produced while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Broker connection settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
    pub client_id_prefix: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            keep_alive_secs: 60,
            client_id_prefix: "banc_script_".into(),
        }
    }
}

/// Filesystem locations shared with the console and the printing service.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub data_root: PathBuf,
    pub archive_root: PathBuf,
    pub registry: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            archive_root: PathBuf::from("data/archive_fails"),
            registry: PathBuf::from("bancs_config.json"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchdogConfig {
    pub timeout_secs: u64,
    pub check_interval_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            check_interval_secs: 10,
        }
    }
}

/// Bench specific behaviour.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BenchConfig {
    /// Station ids accepted on the command line.
    pub valid: Vec<String>,
    /// Number of per-cell columns in the telemetry log header.
    pub cell_count: usize,
    /// Reject running steps lower than the current one.
    pub enforce_monotonic_steps: bool,
    /// Pause after the completion handoff before disconnecting.
    pub settle_secs: f64,
    /// Command line fragment identifying the printing service process.
    pub printer_process: String,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            valid: (1..=4).map(|i| format!("banc{i}")).collect(),
            cell_count: 15,
            enforce_monotonic_steps: false,
            settle_secs: 5.0,
            printer_process: "printer.py".into(),
        }
    }
}

/// Complete configuration of one control process.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct StationConfig {
    pub bus: BusConfig,
    pub paths: PathsConfig,
    pub watchdog: WatchdogConfig,
    pub station: BenchConfig,
}

impl StationConfig {
    /// Load the configuration.
    ///
    /// An explicit path must exist. Without one, `$BANC_CONFIG` and then
    /// `./banc.toml` are tried; when neither exists the defaults are used.
    /// Environment overrides are applied last and the result is validated.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let candidate = std::env::var("BANC_CONFIG")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
                if candidate.exists() {
                    Self::from_file(&candidate)?
                } else {
                    log::debug!("no config file at {}, using defaults", candidate.display());
                    Self::default()
                }
            }
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("BANC_MQTT_HOST") {
            self.bus.host = host;
        }
        if let Ok(port) = std::env::var("BANC_MQTT_PORT") {
            self.bus.port = port.trim().parse().map_err(|_| ConfigError::Env {
                var: "BANC_MQTT_PORT",
                value: port.clone(),
            })?;
        }
        if let Ok(dir) = std::env::var("BANC_DATA_DIR") {
            self.paths.data_root = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("BANC_ARCHIVE_DIR") {
            self.paths.archive_root = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("BANC_REGISTRY") {
            self.paths.registry = PathBuf::from(path);
        }
        Ok(())
    }

    /// Reject values the process cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watchdog.timeout_secs == 0 {
            return Err(ConfigError::Invalid("watchdog.timeout_secs must be > 0".into()));
        }
        if self.watchdog.check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "watchdog.check_interval_secs must be > 0".into(),
            ));
        }
        if self.station.valid.is_empty() {
            return Err(ConfigError::Invalid("station.valid must not be empty".into()));
        }
        if !self.station.settle_secs.is_finite() || self.station.settle_secs < 0.0 {
            return Err(ConfigError::Invalid("station.settle_secs must be >= 0".into()));
        }
        Ok(())
    }

    /// Whether `station` (already lower-cased) is a configured bench.
    pub fn is_valid_station(&self, station: &str) -> bool {
        self.station
            .valid
            .iter()
            .any(|s| s.eq_ignore_ascii_case(station))
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog.timeout_secs)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog.check_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs_f64(self.station.settle_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.bus.keep_alive_secs.max(5))
    }
}
