//! Error types for the tunmon connection watchdog
//!
//! This module defines all error types used throughout the crate,
//! providing consistent error handling and user-friendly error messages.

use thiserror::Error;

/// Main error type for the tunmon application
#[derive(Error, Debug)]
pub enum TunmonError {
    /// Errors related to configuration loading/parsing
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors related to engine start/stop requests
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Errors related to monitor construction
    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {path}")]
    LoadFailed { path: String },

    #[error("Failed to save configuration file: {path}")]
    SaveFailed { path: String },

    #[error("Configuration validation error: {message}")]
    ValidationError { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },
}

/// Errors surfaced by the external engine-process collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Failed to start tunnel: {reason}")]
    StartFailed { reason: String },

    #[error("Failed to stop tunnel: {reason}")]
    StopFailed { reason: String },

    #[error("Engine command exited with status {status}: {command}")]
    CommandFailed { command: String, status: i32 },
}

/// Errors that can occur while constructing monitors
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Invalid metrics endpoint URL: {0}")]
    InvalidMetricsUrl(String),

    #[error("HTTP client creation failed: {0}")]
    ClientCreationFailed(#[from] reqwest::Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TunmonError>;
