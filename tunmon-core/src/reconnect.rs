//! Automatic reconnection policy
//!
//! Pure decision logic: given the configured policy and the history of
//! attempts, decide whether another reconnect may proceed and how long
//! to wait first. The service never touches the engine or the monitors;
//! the `ConnectionManager` owns execution.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Maximum random jitter added to each backoff delay
const JITTER_MILLIS: u64 = 500;

/// Backoff and attempt-budget settings, derived from `MonitorConfig`
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Whether automatic reconnection is permitted at all
    pub enabled: bool,

    /// Attempt budget before the lineage is declared failed
    pub max_attempts: u32,

    /// Base delay in seconds for the first attempt
    pub backoff_base_secs: u64,

    /// Growth factor between attempts
    pub backoff_multiplier: u32,

    /// Upper bound on any single delay
    pub backoff_cap_secs: u64,

    /// Sustained healthy traffic for this long resets the attempt counter
    pub stability_reset_secs: u64,
}

/// Outcome of asking whether a reconnect may proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reconnect approved; execute after `delay`
    Approved { delay: Duration },

    /// Policy disabled (config or battery saver); no reconnect
    Disabled,

    /// Attempt budget spent; lineage must be declared failed
    Exhausted,
}

/// Tracks reconnect attempts for one connection lineage
#[derive(Debug)]
pub struct AutoReconnectService {
    policy: ReconnectPolicy,
    attempts: u32,
    resumed_since: Option<Instant>,
}

impl AutoReconnectService {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            resumed_since: None,
        }
    }

    /// Number of attempts consumed so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Decide whether a reconnect may proceed right now
    ///
    /// On approval the attempt is counted immediately, so a scheduled
    /// reconnect that never executes (e.g. traffic resumed first) still
    /// consumed budget until stability resets it.
    pub fn evaluate(&mut self) -> ReconnectDecision {
        if !self.policy.enabled {
            debug!("Reconnect policy disabled, not attempting");
            return ReconnectDecision::Disabled;
        }

        if self.attempts >= self.policy.max_attempts {
            info!(
                "Reconnect budget exhausted after {} attempts",
                self.attempts
            );
            return ReconnectDecision::Exhausted;
        }

        let delay = self.backoff_delay(self.attempts) + Self::jitter();
        self.attempts += 1;
        self.note_degraded();

        info!(
            "Reconnect attempt {}/{} approved with delay {:.1}s",
            self.attempts,
            self.policy.max_attempts,
            delay.as_secs_f64()
        );
        ReconnectDecision::Approved { delay }
    }

    /// Record that traffic resumed at `now`
    pub fn note_resumed(&mut self, now: Instant) {
        if self.resumed_since.is_none() {
            self.resumed_since = Some(now);
        }
    }

    /// Record a new degradation or failure; stability accrual restarts
    pub fn note_degraded(&mut self) {
        self.resumed_since = None;
    }

    /// Reset the attempt counter once traffic has stayed healthy long
    /// enough. Called on every signal so the reset does not depend on a
    /// dedicated timer.
    pub fn observe(&mut self, now: Instant) {
        if self.attempts == 0 {
            return;
        }
        if let Some(since) = self.resumed_since {
            if now.duration_since(since) >= Duration::from_secs(self.policy.stability_reset_secs) {
                info!(
                    "Connection stable for {}s, resetting reconnect attempts",
                    self.policy.stability_reset_secs
                );
                self.attempts = 0;
            }
        }
    }

    /// Forget all history; used when the user starts a fresh session
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.resumed_since = None;
    }

    /// Exponential backoff: base * multiplier^attempt, capped
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let raw = self
            .policy
            .backoff_base_secs
            .saturating_mul((self.policy.backoff_multiplier as u64).saturating_pow(attempt));
        Duration::from_secs(raw.min(self.policy.backoff_cap_secs))
    }

    fn jitter() -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(0..JITTER_MILLIS))
    }
}
