//! Driver configuration management

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Process-wide driver settings, fixed once the driver is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Inbound ring buffer capacity, in reports.
    #[serde(default = "DriverConfig::default_ring_capacity")]
    pub ring_capacity: usize,

    /// Minimum interrupt-in polling interval in milliseconds.
    #[serde(default = "DriverConfig::default_interval_ms")]
    pub interrupt_in_interval_ms: u64,

    /// Minimum interrupt-out interval in milliseconds.
    #[serde(default = "DriverConfig::default_interval_ms")]
    pub interrupt_out_interval_ms: u64,

    /// Drop redundant "still offline" reports instead of queueing
    /// them. Off by default: it discards data.
    #[serde(default)]
    pub suppress_offline_events: bool,

    /// Coalesce back-to-back wheel-turn reports instead of queueing
    /// each one. Off by default: it discards data.
    #[serde(default)]
    pub compress_wheel_events: bool,

    /// Default log filter level.
    #[serde(default = "DriverConfig::default_log_level")]
    pub log_level: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            ring_capacity: Self::default_ring_capacity(),
            interrupt_in_interval_ms: Self::default_interval_ms(),
            interrupt_out_interval_ms: Self::default_interval_ms(),
            suppress_offline_events: false,
            compress_wheel_events: false,
            log_level: Self::default_log_level(),
        }
    }
}

/// Configuration loading/validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("no configuration file found")]
    NotFound,
}

impl DriverConfig {
    fn default_ring_capacity() -> usize {
        1000
    }

    fn default_interval_ms() -> u64 {
        10
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    /// Load configuration from `path`, or from the default location
    /// when `path` is `None`.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p,
            None => {
                let candidate = Self::default_path();
                if !candidate.exists() {
                    return Err(ConfigError::NotFound);
                }
                candidate
            }
        };

        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;

        let config: DriverConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: config_path.clone(),
                source,
            })?;

        config.validate()?;
        tracing::info!("loaded configuration from {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or fall back to defaults.
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(ConfigError::NotFound) => Self::default(),
            Err(e) => {
                tracing::warn!("failed to load config: {e}, using defaults");
                Self::default()
            }
        }
    }

    /// Save configuration to `path` as TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!("saved configuration to {}", path.display());
        Ok(())
    }

    /// Default configuration file location.
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("tranzport").join("config.toml")
        } else {
            PathBuf::from(".config/tranzport/config.toml")
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring_capacity < 2 {
            return Err(ConfigError::Invalid(format!(
                "ring_capacity must be at least 2, got {}",
                self.ring_capacity
            )));
        }

        if self.interrupt_in_interval_ms == 0 || self.interrupt_out_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "interrupt intervals must be nonzero".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }
}
