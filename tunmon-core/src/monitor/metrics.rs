//! Clash-compatible metrics API client
//!
//! The engine exposes cumulative traffic counters over a small HTTP API
//! (`GET /connections`). The client treats every failure mode the same
//! way: "no data this poll". Transport errors must never be confused
//! with a traffic stall.

use crate::error::MonitorError;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Point-in-time view of the engine's cumulative traffic counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Cumulative bytes sent through the tunnel
    pub uplink_bytes: u64,

    /// Cumulative bytes received through the tunnel
    pub downlink_bytes: u64,

    /// Number of currently tracked connections
    pub active_connections: usize,
}

impl MetricsSnapshot {
    /// Combined counter used for stall detection
    pub fn total_bytes(&self) -> u64 {
        self.uplink_bytes.saturating_add(self.downlink_bytes)
    }
}

/// Wire format of the engine's `/connections` response
#[derive(Debug, Deserialize)]
struct ConnectionsResponse {
    #[serde(rename = "uploadTotal")]
    upload_total: u64,

    #[serde(rename = "downloadTotal")]
    download_total: u64,

    #[serde(default)]
    connections: Vec<serde_json::Value>,
}

/// HTTP client for the engine's metrics endpoint
#[derive(Debug, Clone)]
pub struct MetricsClient {
    client: reqwest::Client,
    connections_url: String,
}

impl MetricsClient {
    /// Create a client for the given base URL
    ///
    /// Validates the URL up front so a misconfigured endpoint fails at
    /// construction rather than silently reading as a permanent stall.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, MonitorError> {
        let url = Url::parse(base_url)
            .map_err(|e| MonitorError::InvalidMetricsUrl(format!("{}: {}", base_url, e)))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(MonitorError::InvalidMetricsUrl(format!(
                    "unsupported scheme '{}' in {}",
                    scheme, base_url
                )));
            }
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            connections_url: format!("{}/connections", base_url.trim_end_matches('/')),
        })
    }

    /// Fetch the current traffic counters
    ///
    /// Returns `None` on any transport or decode failure. Callers skip
    /// the poll cycle when no data is available.
    pub async fn fetch_snapshot(&self) -> Option<MetricsSnapshot> {
        let response = match self.client.get(&self.connections_url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Metrics request failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            debug!("Metrics endpoint returned status {}", response.status());
            return None;
        }

        match response.json::<ConnectionsResponse>().await {
            Ok(body) => Some(MetricsSnapshot {
                uplink_bytes: body.upload_total,
                downlink_bytes: body.download_total,
                active_connections: body.connections.len(),
            }),
            Err(e) => {
                debug!("Failed to decode metrics response: {}", e);
                None
            }
        }
    }
}
