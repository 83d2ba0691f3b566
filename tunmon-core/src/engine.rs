//! External engine collaborator seam
//!
//! The tunnel engine is a separate process that tunmon does not own.
//! [`EngineControl`] is the narrow control surface the manager drives,
//! and [`EngineEndpoints`] carries the observation points (log file,
//! metrics URL) the monitors attach to.

use crate::config::EngineConfig;
use crate::error::EngineError;
use std::future::Future;
use std::path::PathBuf;

/// Observation points exposed by the engine process
#[derive(Debug, Clone)]
pub struct EngineEndpoints {
    /// Live log file the engine appends to
    pub log_file: PathBuf,

    /// Base URL of the engine's Clash-compatible metrics API
    pub metrics_url: String,
}

impl From<&EngineConfig> for EngineEndpoints {
    fn from(config: &EngineConfig) -> Self {
        Self {
            log_file: config.log_file.clone(),
            metrics_url: config.metrics_url.clone(),
        }
    }
}

/// Control surface over the external tunnel engine
///
/// Implementations start and stop the tunnel however the deployment
/// requires (shell commands, service manager, IPC). Both operations
/// must be idempotent enough that stopping an already-stopped tunnel
/// is not an error.
pub trait EngineControl: Send + Sync + 'static {
    /// Ask the engine to bring the tunnel up
    fn start_tunnel(&self) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Ask the engine to tear the tunnel down
    fn stop_tunnel(&self) -> impl Future<Output = Result<(), EngineError>> + Send;
}
