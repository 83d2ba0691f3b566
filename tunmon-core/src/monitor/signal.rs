//! Monitor signal types
//!
//! Signals are the only output of the monitor tasks. Each one carries
//! the session it was observed under so the manager can discard
//! anything from a superseded session.

use crate::session::SessionId;
use chrono::{DateTime, Utc};

/// What a monitor observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// A fatal signature matched in the engine log stream
    LogError,

    /// The log stream indicated the engine process terminated
    ProcessExited,

    /// Traffic counters stayed flat for the configured number of polls
    TrafficStalled,

    /// Traffic started moving again after a stall
    TrafficResumed,

    /// The warmup grace period ended and stall detection is now armed
    WarmupElapsed,
}

impl SignalKind {
    /// Fatal signals commit a reconnect immediately, without passing
    /// through the degraded state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SignalKind::LogError | SignalKind::ProcessExited)
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::LogError => write!(f, "log_error"),
            SignalKind::ProcessExited => write!(f, "process_exited"),
            SignalKind::TrafficStalled => write!(f, "traffic_stalled"),
            SignalKind::TrafficResumed => write!(f, "traffic_resumed"),
            SignalKind::WarmupElapsed => write!(f, "warmup_elapsed"),
        }
    }
}

/// One observation emitted by a monitor task
#[derive(Debug, Clone)]
pub struct MonitorSignal {
    pub kind: SignalKind,
    pub session: SessionId,
    pub timestamp: DateTime<Utc>,
    /// Free-form context, e.g. the offending log line
    pub detail: Option<String>,
}

impl MonitorSignal {
    pub fn new(kind: SignalKind, session: SessionId) -> Self {
        Self {
            kind,
            session,
            timestamp: Utc::now(),
            detail: None,
        }
    }

    pub fn with_detail(kind: SignalKind, session: SessionId, detail: impl Into<String>) -> Self {
        Self {
            kind,
            session,
            timestamp: Utc::now(),
            detail: Some(detail.into()),
        }
    }
}
