//! Session-scoped health monitoring
//!
//! Two independent observers feed one signal channel: the passive log
//! monitor tails the engine's log for fatal signatures, and the active
//! connectivity monitor polls traffic counters for stalls. The facade
//! in [`service`] ties their lifetimes to a session.

mod log_monitor;
mod metrics;
mod service;
mod signal;
mod traffic_monitor;

pub use metrics::{MetricsClient, MetricsSnapshot};
pub use service::ConnectionMonitoringService;
pub use signal::{MonitorSignal, SignalKind};
