//! Core library for the tunmon connection watchdog
//!
//! This crate provides session-scoped health monitoring and automatic
//! reconnection for an external proxy/tunnel engine process. The engine
//! itself is a collaborator: tunmon only tails its log stream, polls its
//! traffic counters, and asks it to stop/start through [`engine::EngineControl`].

pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod reconnect;
pub mod session;
pub mod state;

pub use config::{EngineConfig, MonitorConfig, TunmonConfig};
pub use engine::{EngineControl, EngineEndpoints};
pub use manager::ConnectionManager;
pub use monitor::{ConnectionMonitoringService, MonitorSignal, SignalKind};
pub use reconnect::{AutoReconnectService, ReconnectDecision, ReconnectPolicy};
pub use session::{Session, SessionId};
pub use state::{ConnectionState, Reason, StateChange};

/// Initialize logging infrastructure
///
/// Sets up tracing with systemd journal logging for production use.
/// In development, logs to stderr with appropriate formatting.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    // Try to use systemd journal logging if available
    #[cfg(target_os = "linux")]
    {
        if std::env::var("JOURNAL_STREAM").is_ok() {
            // We're running under systemd, use journal logging
            let journal_layer = tracing_journald::layer()?;
            tracing_subscriber::registry()
                .with(journal_layer)
                .with(tracing_subscriber::filter::LevelFilter::INFO)
                .init();
            return Ok(());
        }
    }

    // Fallback to stderr logging with pretty formatting
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().pretty())
        .with(tracing_subscriber::filter::LevelFilter::INFO)
        .init();

    Ok(())
}
