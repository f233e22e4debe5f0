//! Monitoring Module
//!
//! Rolling performance metrics, threshold-based health checks and recovery.

mod metrics;
mod performance;
mod recovery;
mod source;

pub use metrics::{
    Counter, HealthState, HealthStatus, LatencyRecord, MemoryRecord, MemorySample, MemoryTrend,
    MetricsSnapshot, MonitorEvent, Report, Sample, SystemInfo,
};
pub use performance::{MonitorConfig, PerformanceMonitor};
pub use recovery::RecoveryAction;
pub use source::{CacheMetricsSource, MetricsSource};
