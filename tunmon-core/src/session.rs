//! Connection session scoping
//!
//! Every connect-to-disconnect lifecycle is identified by a [`SessionId`].
//! All monitor signals carry the session they were observed under, and the
//! manager drops anything tagged with a superseded session. This is what
//! keeps monitor tasks from a torn-down session from corrupting the state
//! of the session that replaced it.

use std::time::SystemTime;

/// Opaque identifier for one connection attempt's lifetime.
///
/// Ids are monotonically increasing across reconnects, so a stale id can
/// never collide with the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One connection attempt's lifetime, owned by the `ConnectionManager`.
///
/// Created on every successful connect; superseded (not deleted) on
/// disconnect or reconnect.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    /// Identifier carried by every signal scoped to this session
    pub id: SessionId,

    /// How many sessions this manager has produced, this one included
    pub generation: u64,

    /// When the session was created
    pub started_at: SystemTime,
}

impl Session {
    /// Create the session for the given generation counter value
    pub fn new(generation: u64) -> Self {
        Self {
            id: SessionId(generation),
            generation,
            started_at: SystemTime::now(),
        }
    }
}
