//! Monitoring facade
//!
//! Owns the pair of monitor tasks for one session and their shared
//! shutdown flag. Monitors never outlive the facade: `shutdown` flips
//! the flag and awaits both tasks before returning.

use crate::config::MonitorConfig;
use crate::engine::EngineEndpoints;
use crate::error::MonitorError;
use crate::monitor::log_monitor::PassiveLogMonitor;
use crate::monitor::metrics::MetricsClient;
use crate::monitor::signal::MonitorSignal;
use crate::monitor::traffic_monitor::{ActiveConnectivityMonitor, StallSettings};
use crate::session::SessionId;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// HTTP timeout for each metrics poll
const METRICS_TIMEOUT: Duration = Duration::from_secs(2);

/// One session's monitoring stack: log tail + traffic polling
pub struct ConnectionMonitoringService {
    session: SessionId,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ConnectionMonitoringService {
    /// Spawn both monitors for `session`, emitting into `signals`
    pub fn start(
        session: SessionId,
        endpoints: &EngineEndpoints,
        config: &MonitorConfig,
        signals: mpsc::Sender<MonitorSignal>,
    ) -> Result<Self, MonitorError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let log_monitor = PassiveLogMonitor::new(
            session,
            endpoints.log_file.clone(),
            signals.clone(),
            shutdown_rx.clone(),
        );

        let client = MetricsClient::new(&endpoints.metrics_url, METRICS_TIMEOUT)?;
        let traffic_monitor = ActiveConnectivityMonitor::new(
            session,
            client,
            StallSettings {
                poll_interval: Duration::from_secs(config.poll_interval_secs),
                epsilon_bytes: config.stall_epsilon_bytes,
                consecutive_polls: config.consecutive_stall_polls,
                warmup_grace: Duration::from_secs(config.warmup_grace_secs),
            },
            signals,
            shutdown_rx,
        );

        let tasks = vec![
            tokio::spawn(log_monitor.run()),
            tokio::spawn(traffic_monitor.run()),
        ];

        info!("Monitoring started for session {}", session);
        Ok(Self {
            session,
            shutdown: shutdown_tx,
            tasks,
        })
    }

    /// Session these monitors are scoped to
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Stop both monitors and wait for them to finish
    pub async fn shutdown(self) {
        debug!("Stopping monitors for session {}", self.session);
        // Receivers may already be gone if both tasks exited on their own
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Monitoring stopped for session {}", self.session);
    }
}
