//! Configuration management for the CiviSense field app.
//!
//! Settings are layered, later layers winning:
//! - Default values
//! - TOML file (`civisense.toml` unless `--config` names another)
//! - Environment variables (`CIVISENSE_DB`, `CIVISENSE_REMOTE_URL`, `CIVISENSE_AUTHOR`)
//! - Command-line flags (applied by the CLI)

use civisense_core::primitives::{DEFAULT_LOCATION_TIMEOUT_MS, DEFAULT_TRANSMIT_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file read when `--config` is not given. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "civisense.toml";

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Local database settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the redb file
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

/// Capture settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Opaque id of the field worker using this device
    #[serde(default = "default_author_ref")]
    pub author_ref: String,

    /// Bound on a single location request
    #[serde(default = "default_location_timeout_ms")]
    pub location_timeout_ms: u64,
}

/// Sync settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the remote authority API
    #[serde(default = "default_remote_url")]
    pub remote_url: String,

    /// Bound on a single transmit
    #[serde(default = "default_transmit_timeout_ms")]
    pub transmit_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: text or json
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_database() -> PathBuf {
    PathBuf::from("civisense.redb")
}

fn default_author_ref() -> String {
    "field-worker".to_string()
}

fn default_location_timeout_ms() -> u64 {
    DEFAULT_LOCATION_TIMEOUT_MS
}

fn default_remote_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_transmit_timeout_ms() -> u64 {
    DEFAULT_TRANSMIT_TIMEOUT_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            author_ref: default_author_ref(),
            location_timeout_ms: default_location_timeout_ms(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: default_remote_url(),
            transmit_timeout_ms: default_transmit_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl CaptureConfig {
    #[must_use]
    pub fn location_timeout(&self) -> Duration {
        Duration::from_millis(self.location_timeout_ms)
    }
}

impl SyncConfig {
    #[must_use]
    pub fn transmit_timeout(&self) -> Duration {
        Duration::from_millis(self.transmit_timeout_ms)
    }
}

impl Config {
    /// Load configuration.
    ///
    /// With `path = None` the default file is read if present, otherwise the
    /// built-in defaults are used. An explicit path must exist. Environment
    /// overrides are applied before validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without applying overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Parse TOML text without applying overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })
    }

    /// Apply environment-style overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("CIVISENSE_DB").filter(|v| !v.is_empty()) {
            self.storage.database = PathBuf::from(db);
        }
        if let Some(url) = lookup("CIVISENSE_REMOTE_URL").filter(|v| !v.is_empty()) {
            self.sync.remote_url = url;
        }
        if let Some(author) = lookup("CIVISENSE_AUTHOR").filter(|v| !v.is_empty()) {
            self.capture.author_ref = author;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.database.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.database cannot be empty".to_string(),
            ));
        }
        if self.capture.author_ref.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "capture.author_ref cannot be empty".to_string(),
            ));
        }
        if self.capture.location_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "capture.location_timeout_ms must be > 0".to_string(),
            ));
        }

        let url = self.sync.remote_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "sync.remote_url must start with http:// or https:// (got '{}')",
                url
            )));
        }
        if self.sync.transmit_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sync.transmit_timeout_ms must be > 0".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of: {} (got '{}')",
                valid_levels.join(", "),
                self.logging.level
            )));
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be text or json (got '{}')",
                self.logging.format
            )));
        }
        Ok(())
    }
}
