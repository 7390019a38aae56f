//! TOML-based application configuration.
//!
//! Stores the backend endpoints and the policy constants of the check-in
//! subsystem (retention window, automatic checkout cap, decoy cadence).
//! Configuration is stored at `~/.config/covisit/config.toml`; absent file
//! or absent fields fall back to production defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::storage::data_dir;

/// Backend endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the problematic-event feed service.
    #[serde(default = "default_trace_url")]
    pub trace_url: String,
    /// Base URL of the code-validation / report-publishing service.
    #[serde(default = "default_publish_url")]
    pub publish_url: String,
    /// Fixed per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Data-retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Days of diary and problematic-event history to keep.
    #[serde(default = "default_days_to_keep")]
    pub days_to_keep: i64,
}

/// Check-in lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInConfig {
    /// Hard cap on a single check-in's duration; longer stays are
    /// automatically checked out at `arrival + max_duration_hours`.
    #[serde(default = "default_max_duration_hours")]
    pub max_duration_hours: i64,
    /// Hours after arrival at which a checkout reminder fires.
    #[serde(default = "default_reminder_hours")]
    pub reminder_hours: i64,
}

/// Decoy-traffic configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoyConfig {
    /// Exponential rate in events per day. 0.2 means one decoy report
    /// every five days on average.
    #[serde(default = "default_rate_per_day")]
    pub rate_per_day: f64,
    /// Lower bound of the randomized delay before a decoy fires.
    #[serde(default = "default_min_start_delay_secs")]
    pub min_start_delay_secs: u64,
    /// Upper bound of the randomized delay before a decoy fires.
    #[serde(default = "default_max_start_delay_secs")]
    pub max_start_delay_secs: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/covisit/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub checkin: CheckInConfig,
    #[serde(default)]
    pub decoy: DecoyConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            trace_url: default_trace_url(),
            publish_url: default_publish_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { days_to_keep: default_days_to_keep() }
    }
}

impl Default for CheckInConfig {
    fn default() -> Self {
        Self {
            max_duration_hours: default_max_duration_hours(),
            reminder_hours: default_reminder_hours(),
        }
    }
}

impl Default for DecoyConfig {
    fn default() -> Self {
        Self {
            rate_per_day: default_rate_per_day(),
            min_start_delay_secs: default_min_start_delay_secs(),
            max_start_delay_secs: default_max_start_delay_secs(),
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/covisit"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load the configuration, falling back to defaults when the file is
    /// absent.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Save the configuration.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, raw).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }
}

// Default functions
fn default_trace_url() -> String {
    "https://trace.covisit.example".into()
}
fn default_publish_url() -> String {
    "https://publish.covisit.example".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_days_to_keep() -> i64 {
    14
}
fn default_max_duration_hours() -> i64 {
    12
}
fn default_reminder_hours() -> i64 {
    8
}
fn default_rate_per_day() -> f64 {
    0.2
}
fn default_min_start_delay_secs() -> u64 {
    20
}
fn default_max_start_delay_secs() -> u64 {
    30
}
