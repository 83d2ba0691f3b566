//! Connection manager
//!
//! Single authority over connection state. All monitor signals funnel
//! through one channel into this type, which serializes every
//! transition: gate on session id, consult the reconnect policy, drive
//! the engine, publish the new state. Monitors observe, the policy
//! decides, the manager executes.

use crate::config::{EngineConfig, MonitorConfig};
use crate::engine::{EngineControl, EngineEndpoints};
use crate::error::Result;
use crate::monitor::{ConnectionMonitoringService, MonitorSignal, SignalKind};
use crate::reconnect::{AutoReconnectService, ReconnectDecision};
use crate::session::{Session, SessionId};
use crate::state::{ConnectionState, Reason, StateChange};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Instant, Sleep};
use tracing::{debug, info, warn};

/// Bound on queued monitor signals; monitors emit rarely, so a small
/// buffer is plenty and backpressure beats unbounded growth.
const SIGNAL_CHANNEL_CAPACITY: usize = 64;

/// Owns the session lifecycle and the connection state machine
pub struct ConnectionManager<E: EngineControl> {
    engine: E,
    endpoints: EngineEndpoints,
    config: MonitorConfig,
    generation: u64,
    current: Option<Session>,
    state: ConnectionState,
    monitoring: Option<ConnectionMonitoringService>,
    reconnect: AutoReconnectService,
    pending: Option<Pin<Box<Sleep>>>,
    pending_reason: Option<Reason>,
    signal_tx: mpsc::Sender<MonitorSignal>,
    signal_rx: mpsc::Receiver<MonitorSignal>,
    state_tx: watch::Sender<StateChange>,
}

impl<E: EngineControl> ConnectionManager<E> {
    pub fn new(engine: E, engine_config: &EngineConfig, config: MonitorConfig) -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(StateChange::initial());
        let reconnect = AutoReconnectService::new(config.reconnect_policy());

        Self {
            engine,
            endpoints: EngineEndpoints::from(engine_config),
            config,
            generation: 0,
            current: None,
            state: ConnectionState::Idle,
            monitoring: None,
            reconnect,
            pending: None,
            pending_reason: None,
            signal_tx,
            signal_rx,
            state_tx,
        }
    }

    /// Subscribe to state transitions
    pub fn subscribe(&self) -> watch::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Session currently considered live, if any
    pub fn current_session(&self) -> Option<Session> {
        self.current
    }

    /// Sender side of the signal channel, for injecting signals from
    /// outside the built-in monitors
    pub fn signal_sender(&self) -> mpsc::Sender<MonitorSignal> {
        self.signal_tx.clone()
    }

    /// Whether monitor tasks are running for the current session
    pub fn monitoring_active(&self) -> bool {
        self.monitoring.is_some()
    }

    /// User-initiated connect: fresh lineage, fresh attempt budget
    pub async fn start_session(&mut self) -> Result<()> {
        self.reconnect.reset();
        self.start_session_inner().await
    }

    /// User-initiated disconnect
    pub async fn stop_session(&mut self) {
        self.cancel_pending();
        if let Some(monitoring) = self.monitoring.take() {
            monitoring.shutdown().await;
        }
        self.current = None;
        if let Err(e) = self.engine.stop_tunnel().await {
            warn!("Engine stop failed during disconnect: {}", e);
        }
        self.set_state(ConnectionState::Disconnected, None);
    }

    /// Consume monitor signals and fire scheduled reconnects until all
    /// signal senders are gone
    pub async fn run(&mut self) {
        loop {
            tokio::select! {
                maybe_signal = self.signal_rx.recv() => {
                    match maybe_signal {
                        Some(signal) => self.handle_signal(signal),
                        None => break,
                    }
                }
                _ = pending_reconnect(&mut self.pending) => {
                    self.execute_reconnect().await;
                }
            }
        }
    }

    /// Apply one monitor signal to the state machine
    pub fn handle_signal(&mut self, signal: MonitorSignal) {
        let Some(current) = self.current else {
            debug!("Signal {} with no live session, discarding", signal.kind);
            return;
        };
        if signal.session != current.id {
            debug!(
                "Stale signal {} from session {} (current is {}), discarding",
                signal.kind, signal.session, current.id
            );
            return;
        }

        self.reconnect.observe(Instant::now());

        match signal.kind {
            SignalKind::LogError | SignalKind::ProcessExited => {
                self.handle_fatal(signal);
            }
            SignalKind::TrafficStalled => {
                self.handle_stall(current.id);
            }
            SignalKind::TrafficResumed => {
                self.reconnect.note_resumed(Instant::now());
                if self.state == ConnectionState::Degraded {
                    info!("Traffic resumed on session {}", current.id);
                    self.cancel_pending();
                    self.set_state(ConnectionState::Connected, Some(Reason::Resumed));
                }
            }
            SignalKind::WarmupElapsed => {
                debug!("Stall detection armed for session {}", current.id);
            }
        }
    }

    fn handle_fatal(&mut self, signal: MonitorSignal) {
        let reason = match signal.kind {
            SignalKind::LogError => Reason::LogError,
            _ => Reason::ProcessExited,
        };
        warn!(
            "Fatal signal {} on session {}: {}",
            signal.kind,
            signal.session,
            signal.detail.as_deref().unwrap_or("no detail")
        );

        // A reconnect is already committed; further fatal evidence for
        // the same session changes nothing.
        if self.state == ConnectionState::Reconnecting {
            return;
        }

        self.reconnect.note_degraded();
        match self.reconnect.evaluate() {
            ReconnectDecision::Approved { delay } => {
                self.set_state(ConnectionState::Reconnecting, Some(reason));
                self.schedule_reconnect(delay, reason);
            }
            ReconnectDecision::Exhausted => {
                self.set_state(ConnectionState::Failed, Some(Reason::PolicyExhausted));
            }
            ReconnectDecision::Disabled => {
                self.set_state(ConnectionState::Failed, Some(reason));
            }
        }
    }

    fn handle_stall(&mut self, session: SessionId) {
        // Only a connected session can degrade; repeated stall signals
        // while degraded or mid-reconnect are ignored.
        if self.state != ConnectionState::Connected {
            return;
        }

        info!("Traffic stalled on session {}", session);
        self.set_state(ConnectionState::Degraded, Some(Reason::Stalled));
        self.reconnect.note_degraded();

        match self.reconnect.evaluate() {
            ReconnectDecision::Approved { delay } => {
                // State stays degraded until the delay elapses; traffic
                // resuming in the meantime cancels the reconnect.
                self.schedule_reconnect(delay, Reason::Stalled);
            }
            ReconnectDecision::Exhausted => {
                self.set_state(ConnectionState::Failed, Some(Reason::PolicyExhausted));
            }
            ReconnectDecision::Disabled => {}
        }
    }

    /// Tear down the current session and bring up its replacement
    async fn execute_reconnect(&mut self) {
        self.pending = None;
        let reason = self.pending_reason.take();

        if self.current.is_none() {
            debug!("Scheduled reconnect with no live session, skipping");
            return;
        }

        if self.state != ConnectionState::Reconnecting {
            self.set_state(ConnectionState::Reconnecting, reason);
        }

        if let Some(monitoring) = self.monitoring.take() {
            monitoring.shutdown().await;
        }

        if let Err(e) = self.engine.stop_tunnel().await {
            warn!("Engine stop failed during reconnect: {}", e);
            self.set_state(ConnectionState::Failed, reason);
            return;
        }

        // Deliberately does not reset the attempt budget; only user
        // action or sustained stability does that.
        if let Err(e) = self.start_session_inner().await {
            warn!("Reconnect attempt failed: {}", e);
        }
    }

    async fn start_session_inner(&mut self) -> Result<()> {
        if let Some(monitoring) = self.monitoring.take() {
            monitoring.shutdown().await;
        }
        self.cancel_pending();
        self.current = None;
        self.set_state(ConnectionState::Connecting, None);

        self.generation += 1;
        let session = Session::new(self.generation);

        if let Err(e) = self.engine.start_tunnel().await {
            warn!("Engine start failed: {}", e);
            self.set_state(ConnectionState::Failed, None);
            return Err(e.into());
        }

        self.current = Some(session);

        if self.config.monitoring_enabled() {
            let service = ConnectionMonitoringService::start(
                session.id,
                &self.endpoints,
                &self.config,
                self.signal_tx.clone(),
            )?;
            self.monitoring = Some(service);
        } else {
            debug!("Monitoring disabled by configuration, session {} unwatched", session.id);
        }

        self.set_state(ConnectionState::Connected, None);
        info!("Session {} connected", session.id);
        Ok(())
    }

    fn schedule_reconnect(&mut self, delay: Duration, reason: Reason) {
        info!(
            "Reconnect scheduled in {:.1}s (reason: {})",
            delay.as_secs_f64(),
            reason
        );
        self.pending = Some(Box::pin(sleep(delay)));
        self.pending_reason = Some(reason);
    }

    fn cancel_pending(&mut self) {
        if self.pending.take().is_some() {
            debug!("Cancelled scheduled reconnect");
        }
        self.pending_reason = None;
    }

    fn set_state(&mut self, state: ConnectionState, reason: Option<Reason>) {
        self.state = state;
        let change = StateChange {
            state,
            reason,
            session: self.current.map(|s| s.id),
        };
        let modified = self.state_tx.send_if_modified(|value| {
            if *value == change {
                false
            } else {
                *value = change;
                true
            }
        });
        if modified {
            info!(
                "Connection state: {}{}",
                state,
                reason.map(|r| format!(" ({})", r)).unwrap_or_default()
            );
        }
    }
}

/// Resolves when the scheduled reconnect delay elapses; pends forever
/// when nothing is scheduled
async fn pending_reconnect(pending: &mut Option<Pin<Box<Sleep>>>) {
    match pending {
        Some(delay) => delay.as_mut().await,
        None => std::future::pending().await,
    }
}
