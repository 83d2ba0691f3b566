//! Active connectivity monitor
//!
//! Polls the engine's cumulative traffic counters and reports sustained
//! stalls. A stall is only ever reported once per episode; when traffic
//! moves again a single resume event follows. During the warmup grace
//! period after connect, polls still run (to establish a baseline) but
//! stall detection is disarmed.

use crate::monitor::metrics::MetricsClient;
use crate::monitor::signal::{MonitorSignal, SignalKind};
use crate::session::SessionId;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, trace};

/// Stall-detection knobs, lifted out of `MonitorConfig`
#[derive(Debug, Clone, Copy)]
pub(crate) struct StallSettings {
    pub(crate) poll_interval: Duration,
    pub(crate) epsilon_bytes: u64,
    pub(crate) consecutive_polls: u32,
    pub(crate) warmup_grace: Duration,
}

/// Edge detected by the stall tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StallEvent {
    Stalled,
    Resumed,
}

/// Pure stall-detection state machine over per-poll traffic deltas
#[derive(Debug)]
pub(crate) struct StallTracker {
    epsilon_bytes: u64,
    consecutive_polls: u32,
    flat_polls: u32,
    stalled: bool,
}

impl StallTracker {
    pub(crate) fn new(epsilon_bytes: u64, consecutive_polls: u32) -> Self {
        Self {
            epsilon_bytes,
            consecutive_polls,
            flat_polls: 0,
            stalled: false,
        }
    }

    /// Feed one poll's traffic delta; returns an event only on the edge
    pub(crate) fn record(&mut self, delta_bytes: u64) -> Option<StallEvent> {
        if delta_bytes < self.epsilon_bytes {
            self.flat_polls += 1;
            if !self.stalled && self.flat_polls >= self.consecutive_polls {
                self.stalled = true;
                return Some(StallEvent::Stalled);
            }
            None
        } else {
            self.flat_polls = 0;
            if self.stalled {
                self.stalled = false;
                return Some(StallEvent::Resumed);
            }
            None
        }
    }
}

/// Polls traffic counters for the lifetime of one session
pub(crate) struct ActiveConnectivityMonitor {
    session: SessionId,
    client: MetricsClient,
    settings: StallSettings,
    signals: mpsc::Sender<MonitorSignal>,
    shutdown: watch::Receiver<bool>,
}

impl ActiveConnectivityMonitor {
    pub(crate) fn new(
        session: SessionId,
        client: MetricsClient,
        settings: StallSettings,
        signals: mpsc::Sender<MonitorSignal>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            session,
            client,
            settings,
            signals,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(
            "Traffic monitor started for session {} (poll every {:?}, warmup {:?})",
            self.session, self.settings.poll_interval, self.settings.warmup_grace
        );

        let mut tracker = StallTracker::new(
            self.settings.epsilon_bytes,
            self.settings.consecutive_polls,
        );
        let mut last_total: Option<u64> = None;
        let mut armed = false;

        let warmup = sleep(self.settings.warmup_grace);
        tokio::pin!(warmup);

        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; consume it so polls start
        // one interval after connect.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut warmup, if !armed => {
                    armed = true;
                    debug!("Warmup grace elapsed for session {}", self.session);
                    let signal = MonitorSignal::new(SignalKind::WarmupElapsed, self.session);
                    if self.signals.send(signal).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if !self.poll(&mut tracker, &mut last_total, armed).await {
                        break;
                    }
                }
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        debug!("Traffic monitor for session {} shutting down", self.session);
                        break;
                    }
                }
            }
        }
    }

    /// One poll cycle. Returns false when the signal channel is closed.
    async fn poll(
        &self,
        tracker: &mut StallTracker,
        last_total: &mut Option<u64>,
        armed: bool,
    ) -> bool {
        // No data means no judgement: a dead metrics endpoint is not a
        // traffic stall.
        let Some(snapshot) = self.client.fetch_snapshot().await else {
            trace!("No metrics data this poll, skipping");
            return true;
        };

        let total = snapshot.total_bytes();
        let previous = last_total.replace(total);

        // Baseline polls during warmup keep last_total current so the
        // first armed poll sees a real delta.
        if !armed {
            return true;
        }

        let Some(previous) = previous else {
            return true;
        };

        let delta = total.saturating_sub(previous);
        trace!(
            "Session {} traffic delta {}B over {} connections",
            self.session,
            delta,
            snapshot.active_connections
        );

        let event = match tracker.record(delta) {
            Some(event) => event,
            None => return true,
        };

        let signal = match event {
            StallEvent::Stalled => MonitorSignal::with_detail(
                SignalKind::TrafficStalled,
                self.session,
                format!("traffic flat for {} polls", self.settings.consecutive_polls),
            ),
            StallEvent::Resumed => MonitorSignal::new(SignalKind::TrafficResumed, self.session),
        };
        self.signals.send(signal).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stall_reported_once_after_threshold() {
        let mut tracker = StallTracker::new(200, 3);
        assert_eq!(tracker.record(0), None);
        assert_eq!(tracker.record(50), None);
        assert_eq!(tracker.record(199), Some(StallEvent::Stalled));
        // Further flat polls stay silent
        assert_eq!(tracker.record(0), None);
        assert_eq!(tracker.record(0), None);
    }

    #[test]
    fn test_resume_clears_stall_and_counter() {
        let mut tracker = StallTracker::new(200, 3);
        tracker.record(0);
        tracker.record(0);
        assert_eq!(tracker.record(0), Some(StallEvent::Stalled));
        assert_eq!(tracker.record(4096), Some(StallEvent::Resumed));
        // Counter restarted: takes three flat polls again
        assert_eq!(tracker.record(0), None);
        assert_eq!(tracker.record(0), None);
        assert_eq!(tracker.record(0), Some(StallEvent::Stalled));
    }

    #[test]
    fn test_healthy_traffic_never_signals() {
        let mut tracker = StallTracker::new(200, 3);
        for _ in 0..10 {
            assert_eq!(tracker.record(1500), None);
        }
    }

    #[test]
    fn test_intermittent_traffic_resets_counter() {
        let mut tracker = StallTracker::new(200, 3);
        assert_eq!(tracker.record(0), None);
        assert_eq!(tracker.record(0), None);
        assert_eq!(tracker.record(300), None);
        assert_eq!(tracker.record(0), None);
        assert_eq!(tracker.record(0), None);
        assert_eq!(tracker.record(0), Some(StallEvent::Stalled));
    }
}
