//! Metric samples, health verdicts and report shapes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

// == Samples ==
/// Memory reading from a metrics source.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct MemorySample {
    pub used_bytes: u64,
    pub total_bytes: u64,
    /// Resident set size, when the source can observe the process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rss_bytes: Option<u64>,
}

impl MemorySample {
    /// `used / total`, or 0 when the total is unknown.
    pub fn usage_ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.total_bytes as f64
        }
    }
}

/// One reading from a [`MetricsSource`](super::MetricsSource).
///
/// Fields a source cannot observe stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    pub memory: Option<MemorySample>,
    pub latency_ms: Option<u64>,
    pub connected: Option<bool>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemoryRecord {
    pub recorded_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) at: Instant,
    #[serde(flatten)]
    pub sample: MemorySample,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LatencyRecord {
    pub recorded_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) at: Instant,
    pub latency_ms: u64,
}

// == Counters ==
/// Counters maintained by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    CommandsExecuted,
    MessagesProcessed,
    Errors,
}

// == Health ==
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Critical,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthStatus {
    pub status: HealthState,
    pub issues: Vec<String>,
}

impl HealthStatus {
    pub fn is_critical(&self) -> bool {
        self.status == HealthState::Critical
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTrend {
    Increasing,
    Decreasing,
    Stable,
}

// == Snapshots ==
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub uptime_ms: u64,
    pub commands_executed: u64,
    pub messages_processed: u64,
    pub errors: u64,
    pub latest_memory: Option<MemoryRecord>,
    pub latest_latency: Option<LatencyRecord>,
    /// Mean of the most recent latency samples
    pub average_latency_ms: f64,
    pub memory_trend: MemoryTrend,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SystemInfo {
    pub os: &'static str,
    pub arch: &'static str,
    pub cpu_count: usize,
    pub crate_version: &'static str,
}

impl SystemInfo {
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            crate_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Report {
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
    pub health: HealthStatus,
    pub system: SystemInfo,
}

// == Events ==
/// Notifications broadcast by the monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    MetricsCollected(MetricsSnapshot),
    Unhealthy(HealthStatus),
    Critical(HealthStatus),
    /// Recovery left the process critical; the host decides whether to restart
    RestartRequested(HealthStatus),
}
