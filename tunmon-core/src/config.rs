//! Configuration module
//!
//! Handles loading and saving tunmon configuration from TOML files,
//! including the monitoring/reconnect policy knobs and the wiring to
//! the external engine process (log file, metrics endpoint).

use crate::error::{ConfigError, TunmonError};
use crate::reconnect::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Complete TOML configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunmonConfig {
    /// Engine collaborator wiring
    #[serde(rename = "engine")]
    pub engine: EngineConfig,

    /// Monitoring and reconnect settings
    #[serde(rename = "monitoring", default)]
    pub monitoring: MonitorConfig,
}

impl TunmonConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, TunmonError> {
        use tracing::{debug, info, warn};

        let contents = std::fs::read_to_string(path).map_err(|e| {
            TunmonError::Config(ConfigError::IoError {
                message: format!("Failed to read config file: {}", e),
            })
        })?;

        let config: TunmonConfig = toml::from_str(&contents).map_err(|e| {
            TunmonError::Config(ConfigError::ValidationError {
                message: format!("Failed to parse config file: {}", e),
            })
        })?;

        debug!("Validating monitoring configuration");
        config.monitoring.validate().map_err(|e| {
            warn!("Monitoring configuration validation failed: {}", e);
            TunmonError::Config(ConfigError::ValidationError {
                message: format!("Invalid monitoring configuration: {}", e),
            })
        })?;
        config.engine.validate().map_err(|e| {
            warn!("Engine configuration validation failed: {}", e);
            TunmonError::Config(ConfigError::ValidationError {
                message: format!("Invalid engine configuration: {}", e),
            })
        })?;

        info!(
            "Loaded configuration: log_file={}, metrics_url={}, poll_interval={}s, max_attempts={}",
            config.engine.log_file.display(),
            config.engine.metrics_url,
            config.monitoring.poll_interval_secs,
            config.monitoring.max_reconnect_attempts
        );

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), TunmonError> {
        let contents = toml::to_string_pretty(self).map_err(|e| {
            TunmonError::Config(ConfigError::ValidationError {
                message: format!("Failed to serialize config: {}", e),
            })
        })?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TunmonError::Config(ConfigError::IoError {
                    message: format!("Failed to create config directory: {}", e),
                })
            })?;
        }

        std::fs::write(path, contents).map_err(|e| {
            TunmonError::Config(ConfigError::IoError {
                message: format!("Failed to write config file: {}", e),
            })
        })?;

        Ok(())
    }
}

/// Wiring to the external engine process
///
/// The engine is a collaborator: tunmon reads its log stream and polls
/// its metrics endpoint, and may invoke the configured start/stop
/// commands through the bin-side adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the engine's live log file
    pub log_file: PathBuf,

    /// Base URL of the engine's Clash-compatible metrics API
    #[serde(default = "default_metrics_url")]
    pub metrics_url: String,

    /// Shell command that starts the tunnel (optional; engine may be
    /// managed externally)
    #[serde(default)]
    pub start_command: Option<String>,

    /// Shell command that stops the tunnel
    #[serde(default)]
    pub stop_command: Option<String>,
}

impl EngineConfig {
    /// Validate metrics_url is a usable HTTP/HTTPS base URL
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        use url::Url;

        match Url::parse(&self.metrics_url) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(()),
                scheme => Err(ConfigValidationError::InvalidMetricsUrl(format!(
                    "URL scheme must be http or https, got: {}",
                    scheme
                ))),
            },
            Err(e) => Err(ConfigValidationError::InvalidMetricsUrl(format!(
                "Failed to parse URL: {}",
                e
            ))),
        }
    }
}

fn default_metrics_url() -> String {
    // Clash API port used by the engine's stats endpoint
    "http://127.0.0.1:9099".to_string()
}

/// Monitoring and auto-reconnect configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Master switch for the monitoring subsystem
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Battery saver mode: disables monitoring and auto-reconnect
    #[serde(default)]
    pub battery_saver: bool,

    /// Seconds between traffic-counter polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Traffic delta below this many bytes counts as a stall sample
    /// (small deltas are TCP retry noise, not real traffic)
    #[serde(default = "default_stall_epsilon")]
    pub stall_epsilon_bytes: u64,

    /// Consecutive stall samples before a stall is reported
    #[serde(default = "default_consecutive_stall_polls")]
    pub consecutive_stall_polls: u32,

    /// Seconds after connect during which stall detection is suppressed
    #[serde(default = "default_warmup_grace")]
    pub warmup_grace_secs: u64,

    /// Maximum automatic reconnect attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_reconnect_attempts: u32,

    /// Base interval in seconds for exponential backoff
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,

    /// Multiplier for exponential backoff (typically 2)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,

    /// Cap in seconds for exponential backoff growth
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,

    /// Seconds of sustained resumed traffic that reset the attempt counter
    #[serde(default = "default_stability_reset")]
    pub stability_reset_secs: u64,
}

fn default_enabled() -> bool {
    true
}
fn default_poll_interval() -> u64 {
    3
}
fn default_stall_epsilon() -> u64 {
    200
}
fn default_consecutive_stall_polls() -> u32 {
    3
}
fn default_warmup_grace() -> u64 {
    10
}
fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_base() -> u64 {
    2
}
fn default_backoff_multiplier() -> u32 {
    2
}
fn default_backoff_cap() -> u64 {
    30
}
fn default_stability_reset() -> u64 {
    60
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            battery_saver: false,
            poll_interval_secs: default_poll_interval(),
            stall_epsilon_bytes: default_stall_epsilon(),
            consecutive_stall_polls: default_consecutive_stall_polls(),
            warmup_grace_secs: default_warmup_grace(),
            max_reconnect_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_cap_secs: default_backoff_cap(),
            stability_reset_secs: default_stability_reset(),
        }
    }
}

impl MonitorConfig {
    /// Validate the entire configuration
    ///
    /// Checks all fields against their valid ranges and constraints.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.validate_poll_interval()?;
        self.validate_consecutive_stall_polls()?;
        self.validate_warmup_grace()?;
        self.validate_max_attempts()?;
        self.validate_backoff_base()?;
        self.validate_backoff_multiplier()?;
        self.validate_backoff_cap()?;
        Ok(())
    }

    /// Derive the reconnect policy from the monitoring settings
    ///
    /// Battery saver disables automatic reconnection entirely.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.enabled && !self.battery_saver,
            max_attempts: self.max_reconnect_attempts,
            backoff_base_secs: self.backoff_base_secs,
            backoff_multiplier: self.backoff_multiplier,
            backoff_cap_secs: self.backoff_cap_secs,
            stability_reset_secs: self.stability_reset_secs,
        }
    }

    /// Whether the monitoring facade should be constructed at all
    pub fn monitoring_enabled(&self) -> bool {
        self.enabled && !self.battery_saver
    }

    fn validate_poll_interval(&self) -> Result<(), ConfigValidationError> {
        if self.poll_interval_secs < 1 || self.poll_interval_secs > 3600 {
            Err(ConfigValidationError::InvalidPollInterval(
                self.poll_interval_secs,
            ))
        } else {
            Ok(())
        }
    }

    fn validate_consecutive_stall_polls(&self) -> Result<(), ConfigValidationError> {
        if self.consecutive_stall_polls < 1 || self.consecutive_stall_polls > 10 {
            Err(ConfigValidationError::InvalidConsecutiveStallPolls(
                self.consecutive_stall_polls,
            ))
        } else {
            Ok(())
        }
    }

    fn validate_warmup_grace(&self) -> Result<(), ConfigValidationError> {
        if self.warmup_grace_secs > 300 {
            Err(ConfigValidationError::InvalidWarmupGrace(
                self.warmup_grace_secs,
            ))
        } else {
            Ok(())
        }
    }

    fn validate_max_attempts(&self) -> Result<(), ConfigValidationError> {
        if self.max_reconnect_attempts < 1 || self.max_reconnect_attempts > 20 {
            Err(ConfigValidationError::InvalidMaxAttempts(
                self.max_reconnect_attempts,
            ))
        } else {
            Ok(())
        }
    }

    fn validate_backoff_base(&self) -> Result<(), ConfigValidationError> {
        if self.backoff_base_secs < 1 || self.backoff_base_secs > 300 {
            Err(ConfigValidationError::InvalidBackoffBase(
                self.backoff_base_secs,
            ))
        } else {
            Ok(())
        }
    }

    fn validate_backoff_multiplier(&self) -> Result<(), ConfigValidationError> {
        if self.backoff_multiplier < 1 || self.backoff_multiplier > 10 {
            Err(ConfigValidationError::InvalidBackoffMultiplier(
                self.backoff_multiplier,
            ))
        } else {
            Ok(())
        }
    }

    fn validate_backoff_cap(&self) -> Result<(), ConfigValidationError> {
        if self.backoff_cap_secs < self.backoff_base_secs {
            Err(ConfigValidationError::BackoffCapLessThanBase(
                self.backoff_cap_secs,
                self.backoff_base_secs,
            ))
        } else {
            Ok(())
        }
    }
}

/// Validation errors for the monitoring/engine configuration
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("poll_interval_secs must be between 1 and 3600, got: {0}")]
    InvalidPollInterval(u64),

    #[error("consecutive_stall_polls must be between 1 and 10, got: {0}")]
    InvalidConsecutiveStallPolls(u32),

    #[error("warmup_grace_secs must be at most 300, got: {0}")]
    InvalidWarmupGrace(u64),

    #[error("max_reconnect_attempts must be between 1 and 20, got: {0}")]
    InvalidMaxAttempts(u32),

    #[error("backoff_base_secs must be between 1 and 300, got: {0}")]
    InvalidBackoffBase(u64),

    #[error("backoff_multiplier must be between 1 and 10, got: {0}")]
    InvalidBackoffMultiplier(u32),

    #[error("backoff_cap_secs ({0}) must be >= backoff_base_secs ({1})")]
    BackoffCapLessThanBase(u64, u64),

    #[error("metrics_url must be a valid HTTP/HTTPS URL: {0}")]
    InvalidMetricsUrl(String),
}
