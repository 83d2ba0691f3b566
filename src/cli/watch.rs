//! The `watch` command: connect, monitor, reconnect
//!
//! Runs until interrupted. State transitions are printed as they
//! happen; the actual decisions live in `tunmon_core`.

use crate::engine::ExecEngine;
use colored::Colorize;
use std::path::Path;
use tracing::info;
use tunmon_core::error::TunmonError;
use tunmon_core::{ConnectionManager, ConnectionState, StateChange, TunmonConfig};

pub async fn run_watch(config_path: &Path) -> Result<(), TunmonError> {
    let config = TunmonConfig::from_file(config_path)?;

    let engine = ExecEngine::new(
        config.engine.start_command.clone(),
        config.engine.stop_command.clone(),
    );
    let mut manager = ConnectionManager::new(engine, &config.engine, config.monitoring.clone());

    // Print every state transition until the manager goes away
    let mut states = manager.subscribe();
    let printer = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let change = *states.borrow_and_update();
            print_state(&change);
        }
    });

    manager.start_session().await?;

    tokio::select! {
        _ = manager.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, disconnecting");
        }
    }

    manager.stop_session().await;
    printer.abort();
    Ok(())
}

fn print_state(change: &StateChange) {
    let label = match change.state {
        ConnectionState::Idle => "idle".normal(),
        ConnectionState::Connecting => "connecting".cyan(),
        ConnectionState::Connected => "connected".green().bold(),
        ConnectionState::Degraded => "degraded".yellow().bold(),
        ConnectionState::Reconnecting => "reconnecting".yellow(),
        ConnectionState::Failed => "failed".red().bold(),
        ConnectionState::Disconnected => "disconnected".normal(),
    };

    let mut line = format!("state: {}", label);
    if let Some(reason) = change.reason {
        line.push_str(&format!(" ({})", reason));
    }
    if let Some(session) = change.session {
        line.push_str(&format!(" [session {}]", session));
    }
    println!("{}", line);
}
