//! Connection manager state machine tests
//!
//! Uses a mock engine and injects monitor signals directly, so no real
//! log files or metrics endpoints are involved. Monitor tasks still
//! spawn, but they point at a nonexistent log and a closed port and
//! poll so rarely they stay silent.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use tunmon_core::error::EngineError;
use tunmon_core::monitor::{MonitorSignal, SignalKind};
use tunmon_core::{
    ConnectionManager, ConnectionState, EngineConfig, EngineControl, MonitorConfig, Reason,
    Session, StateChange,
};

#[derive(Clone, Default)]
struct MockEngine {
    starts: Arc<AtomicU32>,
    stops: Arc<AtomicU32>,
    fail_start: Arc<AtomicBool>,
}

impl MockEngine {
    fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }
}

impl EngineControl for MockEngine {
    async fn start_tunnel(&self) -> Result<(), EngineError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(EngineError::StartFailed {
                reason: "injected failure".to_string(),
            });
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_tunnel(&self) -> Result<(), EngineError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn engine_config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        log_file: dir.path().join("engine.log"),
        metrics_url: "http://127.0.0.1:9".to_string(),
        start_command: None,
        stop_command: None,
    }
}

/// Monitors stay quiet: huge poll interval and warmup, no log file
fn quiet_config() -> MonitorConfig {
    MonitorConfig {
        poll_interval_secs: 3600,
        warmup_grace_secs: 3600,
        ..MonitorConfig::default()
    }
}

fn stale_signal(kind: SignalKind) -> MonitorSignal {
    // Generation 999 can never match a freshly started manager
    MonitorSignal::new(kind, Session::new(999).id)
}

async fn wait_for(
    states: &mut watch::Receiver<StateChange>,
    target: ConnectionState,
) -> StateChange {
    loop {
        states.changed().await.expect("state channel open");
        let change = *states.borrow_and_update();
        if change.state == target {
            return change;
        }
    }
}

#[tokio::test]
async fn test_start_session_connects_and_monitors() {
    let dir = TempDir::new().expect("tempdir");
    let engine = MockEngine::default();
    let mut manager = ConnectionManager::new(engine.clone(), &engine_config(&dir), quiet_config());

    assert_eq!(manager.state(), ConnectionState::Idle);
    manager.start_session().await.expect("start session");

    assert_eq!(manager.state(), ConnectionState::Connected);
    assert!(manager.monitoring_active());
    assert!(manager.current_session().is_some());
    assert_eq!(engine.starts(), 1);
}

#[tokio::test]
async fn test_stale_signal_is_discarded() {
    let dir = TempDir::new().expect("tempdir");
    let engine = MockEngine::default();
    let mut manager = ConnectionManager::new(engine, &engine_config(&dir), quiet_config());
    manager.start_session().await.expect("start session");

    manager.handle_signal(stale_signal(SignalKind::TrafficStalled));
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.handle_signal(stale_signal(SignalKind::LogError));
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_degraded_is_notified_exactly_once() {
    let dir = TempDir::new().expect("tempdir");
    let engine = MockEngine::default();
    let mut manager = ConnectionManager::new(engine, &engine_config(&dir), quiet_config());
    manager.start_session().await.expect("start session");
    let session = manager.current_session().expect("session").id;

    let mut states = manager.subscribe();
    states.borrow_and_update();

    manager.handle_signal(MonitorSignal::new(SignalKind::TrafficStalled, session));
    assert_eq!(manager.state(), ConnectionState::Degraded);
    assert!(states.has_changed().expect("channel open"));
    let change = *states.borrow_and_update();
    assert_eq!(change.state, ConnectionState::Degraded);
    assert_eq!(change.reason, Some(Reason::Stalled));

    // A second stall for the same episode is silent
    manager.handle_signal(MonitorSignal::new(SignalKind::TrafficStalled, session));
    assert_eq!(manager.state(), ConnectionState::Degraded);
    assert!(!states.has_changed().expect("channel open"));
}

#[tokio::test]
async fn test_resume_recovers_degraded_session() {
    let dir = TempDir::new().expect("tempdir");
    let engine = MockEngine::default();
    let mut manager = ConnectionManager::new(engine.clone(), &engine_config(&dir), quiet_config());
    manager.start_session().await.expect("start session");
    let session = manager.current_session().expect("session").id;

    manager.handle_signal(MonitorSignal::new(SignalKind::TrafficStalled, session));
    assert_eq!(manager.state(), ConnectionState::Degraded);

    manager.handle_signal(MonitorSignal::new(SignalKind::TrafficResumed, session));
    assert_eq!(manager.state(), ConnectionState::Connected);
    let change = *manager.subscribe().borrow();
    assert_eq!(change.reason, Some(Reason::Resumed));

    // The cancelled reconnect never touched the engine
    assert_eq!(engine.starts(), 1);
    assert_eq!(engine.stops(), 0);
}

#[tokio::test]
async fn test_fatal_signal_skips_degraded() {
    let dir = TempDir::new().expect("tempdir");
    let engine = MockEngine::default();
    let mut manager = ConnectionManager::new(engine, &engine_config(&dir), quiet_config());
    manager.start_session().await.expect("start session");
    let session = manager.current_session().expect("session").id;

    let mut states = manager.subscribe();
    states.borrow_and_update();

    manager.handle_signal(MonitorSignal::with_detail(
        SignalKind::LogError,
        session,
        "ERROR dial tcp: connection refused",
    ));

    assert_eq!(manager.state(), ConnectionState::Reconnecting);
    let change = *states.borrow_and_update();
    assert_eq!(change.state, ConnectionState::Reconnecting);
    assert_eq!(change.reason, Some(Reason::LogError));

    // Further fatal evidence for the committed reconnect is ignored
    manager.handle_signal(MonitorSignal::new(SignalKind::ProcessExited, session));
    assert_eq!(manager.state(), ConnectionState::Reconnecting);
}

#[tokio::test]
async fn test_signals_after_disconnect_are_ignored() {
    let dir = TempDir::new().expect("tempdir");
    let engine = MockEngine::default();
    let mut manager = ConnectionManager::new(engine.clone(), &engine_config(&dir), quiet_config());
    manager.start_session().await.expect("start session");
    let session = manager.current_session().expect("session").id;

    manager.stop_session().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(!manager.monitoring_active());
    assert_eq!(engine.stops(), 1);

    // Late signal from the stopped session's monitors
    manager.handle_signal(MonitorSignal::new(SignalKind::LogError, session));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(engine.starts(), 1);
}

#[tokio::test]
async fn test_battery_saver_disables_monitoring_and_reconnect() {
    let dir = TempDir::new().expect("tempdir");
    let engine = MockEngine::default();
    let config = MonitorConfig {
        battery_saver: true,
        ..quiet_config()
    };
    let mut manager = ConnectionManager::new(engine.clone(), &engine_config(&dir), config);
    manager.start_session().await.expect("start session");

    assert_eq!(manager.state(), ConnectionState::Connected);
    assert!(!manager.monitoring_active());

    // Even an injected fatal signal must not trigger a reconnect
    let session = manager.current_session().expect("session").id;
    manager.handle_signal(MonitorSignal::new(SignalKind::LogError, session));
    assert_eq!(manager.state(), ConnectionState::Failed);
    let change = *manager.subscribe().borrow();
    assert_eq!(change.reason, Some(Reason::LogError));
    assert_eq!(engine.starts(), 1);
}

#[tokio::test]
async fn test_engine_start_failure_fails_session() {
    let dir = TempDir::new().expect("tempdir");
    let engine = MockEngine::default();
    engine.fail_start.store(true, Ordering::SeqCst);
    let mut manager = ConnectionManager::new(engine.clone(), &engine_config(&dir), quiet_config());

    assert!(manager.start_session().await.is_err());
    assert_eq!(manager.state(), ConnectionState::Failed);
    assert!(manager.current_session().is_none());
    assert!(!manager.monitoring_active());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_creates_new_session_and_exhausts_budget() {
    let dir = TempDir::new().expect("tempdir");
    let engine = MockEngine::default();
    let config = MonitorConfig {
        max_reconnect_attempts: 1,
        backoff_base_secs: 1,
        ..quiet_config()
    };
    let mut manager = ConnectionManager::new(engine.clone(), &engine_config(&dir), config);
    let signals = manager.signal_sender();

    manager.start_session().await.expect("start session");
    let first = manager.current_session().expect("session").id;

    let mut states = manager.subscribe();
    states.borrow_and_update();

    let driver = async move {
        signals
            .send(MonitorSignal::new(SignalKind::TrafficStalled, first))
            .await
            .expect("send stall");

        wait_for(&mut states, ConnectionState::Degraded).await;

        // The scheduled reconnect replaces the session
        let connected = wait_for(&mut states, ConnectionState::Connected).await;
        let second = connected.session.expect("new session id");
        assert_ne!(second, first);

        // A late signal from the replaced session changes nothing
        signals
            .send(MonitorSignal::new(SignalKind::TrafficStalled, first))
            .await
            .expect("send stale stall");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!states.has_changed().expect("channel open"));

        // The single-attempt budget is spent; the next stall fails
        // the lineage instead of reconnecting again
        signals
            .send(MonitorSignal::new(SignalKind::TrafficStalled, second))
            .await
            .expect("send second stall");
        let failed = wait_for(&mut states, ConnectionState::Failed).await;
        assert_eq!(failed.reason, Some(Reason::PolicyExhausted));
    };

    tokio::select! {
        _ = manager.run() => panic!("manager loop ended unexpectedly"),
        _ = driver => {}
    }

    assert_eq!(manager.state(), ConnectionState::Failed);
    assert_eq!(engine.starts(), 2);
    assert_eq!(engine.stops(), 1);
}

#[tokio::test]
async fn test_user_restart_resets_attempt_budget() {
    let dir = TempDir::new().expect("tempdir");
    let engine = MockEngine::default();
    let config = MonitorConfig {
        max_reconnect_attempts: 1,
        ..quiet_config()
    };
    let mut manager = ConnectionManager::new(engine.clone(), &engine_config(&dir), config);

    manager.start_session().await.expect("start session");
    let session = manager.current_session().expect("session").id;

    // Spend the whole budget
    manager.handle_signal(MonitorSignal::new(SignalKind::TrafficStalled, session));
    assert_eq!(manager.state(), ConnectionState::Degraded);
    manager.handle_signal(MonitorSignal::new(SignalKind::TrafficResumed, session));
    manager.handle_signal(MonitorSignal::new(SignalKind::TrafficStalled, session));
    assert_eq!(manager.state(), ConnectionState::Failed);

    // A fresh user-initiated connect starts with a full budget again
    manager.start_session().await.expect("restart session");
    let session = manager.current_session().expect("session").id;
    manager.handle_signal(MonitorSignal::new(SignalKind::TrafficStalled, session));
    assert_eq!(manager.state(), ConnectionState::Degraded);
}
