//! Shell-command engine adapter
//!
//! Drives the external tunnel engine through configured shell commands.
//! Either command may be absent, in which case the engine is assumed to
//! be managed externally (service manager, another process) and the
//! request is a no-op.

use tokio::process::Command;
use tracing::{debug, info};
use tunmon_core::engine::EngineControl;
use tunmon_core::error::EngineError;

pub struct ExecEngine {
    start_command: Option<String>,
    stop_command: Option<String>,
}

impl ExecEngine {
    pub fn new(start_command: Option<String>, stop_command: Option<String>) -> Self {
        Self {
            start_command,
            stop_command,
        }
    }

    async fn run_command(command: &str) -> std::io::Result<std::process::ExitStatus> {
        debug!("Running engine command: {}", command);
        Command::new("sh").arg("-c").arg(command).status().await
    }
}

impl EngineControl for ExecEngine {
    async fn start_tunnel(&self) -> Result<(), EngineError> {
        let Some(command) = &self.start_command else {
            info!("No start command configured; assuming engine is managed externally");
            return Ok(());
        };

        let status = Self::run_command(command)
            .await
            .map_err(|e| EngineError::StartFailed {
                reason: e.to_string(),
            })?;

        if status.success() {
            info!("Engine start command completed");
            Ok(())
        } else {
            Err(EngineError::CommandFailed {
                command: command.clone(),
                status: status.code().unwrap_or(-1),
            })
        }
    }

    async fn stop_tunnel(&self) -> Result<(), EngineError> {
        let Some(command) = &self.stop_command else {
            info!("No stop command configured; assuming engine is managed externally");
            return Ok(());
        };

        let status = Self::run_command(command)
            .await
            .map_err(|e| EngineError::StopFailed {
                reason: e.to_string(),
            })?;

        if status.success() {
            info!("Engine stop command completed");
            Ok(())
        } else {
            Err(EngineError::CommandFailed {
                command: command.clone(),
                status: status.code().unwrap_or(-1),
            })
        }
    }
}
