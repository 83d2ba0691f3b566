//! Connection state machine types
//!
//! Defines the states a connection lineage moves through and the
//! machine-readable reason codes delivered to downstream subscribers.

use crate::session::SessionId;
use serde::{Deserialize, Serialize};

/// Connection states
///
/// Exactly one state is current per session lineage. Only the
/// `ConnectionManager` performs transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No connection has been attempted yet
    Idle,

    /// Attempting to establish the tunnel
    Connecting,

    /// Tunnel established and carrying traffic
    Connected,

    /// Tunnel logically up but traffic has stalled
    Degraded,

    /// A reconnect attempt has been committed
    Reconnecting,

    /// Reconnect policy exhausted or engine failure; manual action required
    Failed,

    /// Explicit rest state after a user-requested stop
    Disconnected,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Degraded => write!(f, "degraded"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Machine-readable reason code attached to a state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reason {
    /// Sustained near-zero traffic while the tunnel appeared connected
    Stalled,

    /// A fatal signature matched in the engine's log stream
    LogError,

    /// The engine's log stream indicated the process terminated
    ProcessExited,

    /// Reconnect attempts exceeded the configured maximum
    PolicyExhausted,

    /// Traffic started flowing again
    Resumed,
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reason::Stalled => write!(f, "stalled"),
            Reason::LogError => write!(f, "log_error"),
            Reason::ProcessExited => write!(f, "process_exited"),
            Reason::PolicyExhausted => write!(f, "policy_exhausted"),
            Reason::Resumed => write!(f, "resumed"),
        }
    }
}

/// Value delivered on the state subscription channel
///
/// This is the only surface exposed to the UI/CLI layer: the new state,
/// an optional reason code, and the session it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub state: ConnectionState,
    pub reason: Option<Reason>,
    pub session: Option<SessionId>,
}

impl StateChange {
    pub fn initial() -> Self {
        Self {
            state: ConnectionState::Idle,
            reason: None,
            session: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", ConnectionState::Idle), "idle");
        assert_eq!(format!("{}", ConnectionState::Connecting), "connecting");
        assert_eq!(format!("{}", ConnectionState::Connected), "connected");
        assert_eq!(format!("{}", ConnectionState::Degraded), "degraded");
        assert_eq!(format!("{}", ConnectionState::Reconnecting), "reconnecting");
        assert_eq!(format!("{}", ConnectionState::Failed), "failed");
        assert_eq!(format!("{}", ConnectionState::Disconnected), "disconnected");
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(Reason::Stalled.to_string(), "stalled");
        assert_eq!(Reason::LogError.to_string(), "log_error");
        assert_eq!(Reason::ProcessExited.to_string(), "process_exited");
        assert_eq!(Reason::PolicyExhausted.to_string(), "policy_exhausted");
        assert_eq!(Reason::Resumed.to_string(), "resumed");
    }

    #[test]
    fn test_initial_state_change() {
        let change = StateChange::initial();
        assert_eq!(change.state, ConnectionState::Idle);
        assert!(change.reason.is_none());
        assert!(change.session.is_none());
    }
}
