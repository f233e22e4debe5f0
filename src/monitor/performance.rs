//! Performance Monitor
//!
//! Collects samples from a [`MetricsSource`] on a timer, keeps a bounded
//! history, judges health against thresholds and runs recovery actions when
//! the process turns critical.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{
    Counter, HealthState, HealthStatus, LatencyRecord, MemoryRecord, MemoryTrend, MetricsSnapshot,
    MetricsSource, MonitorEvent, RecoveryAction, Report, SystemInfo,
};
use crate::error::{Error, Result};
use crate::tasks::tick_period;

/// Samples considered for average latency and memory trend.
const RECENT_SAMPLES: usize = 10;

/// Relative memory change, in percent, that counts as a trend.
const TREND_THRESHOLD_PERCENT: f64 = 10.0;

const EVENT_CAPACITY: usize = 32;

// == Monitor Config ==
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Sampling and health check period. Default: 30 seconds.
    pub collect_interval: Duration,
    /// Period of the retention sweep. Default: 10 minutes.
    pub retention_sweep_interval: Duration,
    /// Samples older than this are dropped. Default: 1 hour.
    pub metrics_retention: Duration,
    /// Period of the host's stats and cleanup loop. Default: 5 minutes.
    pub health_check_interval: Duration,
    /// Run recovery actions when critical. Default: true.
    pub auto_recovery: bool,
    /// Memory ratio above which the process is critical. Default: 0.9.
    pub critical_memory_threshold: f64,
    /// Memory ratio above which the process is unhealthy. Default: 0.75.
    pub elevated_memory_threshold: f64,
    /// Latency above which the process is unhealthy. Default: 1 second.
    pub critical_latency_threshold: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            collect_interval: Duration::from_secs(30),
            retention_sweep_interval: Duration::from_secs(600),
            metrics_retention: Duration::from_secs(3600),
            health_check_interval: Duration::from_secs(300),
            auto_recovery: true,
            critical_memory_threshold: 0.9,
            elevated_memory_threshold: 0.75,
            critical_latency_threshold: Duration::from_millis(1000),
        }
    }
}

// == History ==
#[derive(Debug, Default)]
struct History {
    memory: VecDeque<MemoryRecord>,
    latency: VecDeque<LatencyRecord>,
    connected: Option<bool>,
}

impl History {
    fn average_latency(&self) -> f64 {
        let recent: Vec<u64> = self
            .latency
            .iter()
            .rev()
            .take(RECENT_SAMPLES)
            .map(|r| r.latency_ms)
            .collect();

        if recent.is_empty() {
            0.0
        } else {
            recent.iter().sum::<u64>() as f64 / recent.len() as f64
        }
    }

    fn memory_trend(&self) -> MemoryTrend {
        let skip = self.memory.len().saturating_sub(RECENT_SAMPLES);
        let mut recent = self.memory.iter().skip(skip);

        let (Some(first), Some(last)) = (recent.next(), recent.last()) else {
            return MemoryTrend::Stable;
        };

        let first = first.sample.used_bytes as f64;
        let last = last.sample.used_bytes as f64;
        if first == 0.0 {
            return if last > 0.0 {
                MemoryTrend::Increasing
            } else {
                MemoryTrend::Stable
            };
        }

        let change = (last - first) / first * 100.0;
        if change > TREND_THRESHOLD_PERCENT {
            MemoryTrend::Increasing
        } else if change < -TREND_THRESHOLD_PERCENT {
            MemoryTrend::Decreasing
        } else {
            MemoryTrend::Stable
        }
    }
}

// == Performance Monitor ==
/// Cloneable handle to a monitor and its background tasks.
#[derive(Clone)]
pub struct PerformanceMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    config: MonitorConfig,
    source: Arc<dyn MetricsSource>,
    recovery: RwLock<Vec<Arc<dyn RecoveryAction>>>,
    history: RwLock<History>,
    commands_executed: AtomicU64,
    messages_processed: AtomicU64,
    errors: AtomicU64,
    started: Instant,
    events: broadcast::Sender<MonitorEvent>,
    tasks: Mutex<Vec<AbortHandle>>,
    destroyed: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for handle in self.tasks.get_mut().drain(..) {
            handle.abort();
        }
    }
}

impl PerformanceMonitor {
    /// Creates a monitor. Nothing runs until [`start`](Self::start).
    pub fn new(config: MonitorConfig, source: Arc<dyn MetricsSource>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                source,
                recovery: RwLock::new(Vec::new()),
                history: RwLock::new(History::default()),
                commands_executed: AtomicU64::new(0),
                messages_processed: AtomicU64::new(0),
                errors: AtomicU64::new(0),
                started: Instant::now(),
                events,
                tasks: Mutex::new(Vec::new()),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: MonitorEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Adds an action to run, in registration order, during recovery.
    pub async fn add_recovery_action(&self, action: Arc<dyn RecoveryAction>) {
        self.inner.recovery.write().await.push(action);
    }

    pub fn increment(&self, counter: Counter) {
        let slot = match counter {
            Counter::CommandsExecuted => &self.inner.commands_executed,
            Counter::MessagesProcessed => &self.inner.messages_processed,
            Counter::Errors => &self.inner.errors,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    // == Collection ==
    /// Takes one sample from the source and records it.
    pub async fn collect_metrics(&self) -> Result<MetricsSnapshot> {
        let sample = match self.inner.source.sample().await {
            Ok(sample) => sample,
            Err(err) => {
                error!(error = %err, "Error collecting performance metrics");
                return Err(Error::Metrics(err.to_string()));
            }
        };

        let at = Instant::now();
        let recorded_at = Utc::now();
        {
            let mut history = self.inner.history.write().await;
            if let Some(memory) = sample.memory {
                history.memory.push_back(MemoryRecord {
                    recorded_at,
                    at,
                    sample: memory,
                });
            }
            if let Some(latency_ms) = sample.latency_ms {
                history.latency.push_back(LatencyRecord {
                    recorded_at,
                    at,
                    latency_ms,
                });
            }
            if let Some(connected) = sample.connected {
                history.connected = Some(connected);
            }
        }

        let snapshot = self.latest_metrics().await;
        self.emit(MonitorEvent::MetricsCollected(snapshot.clone()));
        Ok(snapshot)
    }

    /// Drops samples older than the retention period. Returns how many.
    pub async fn cleanup_old_metrics(&self) -> usize {
        let now = Instant::now();
        let retention = self.inner.config.metrics_retention;
        let mut history = self.inner.history.write().await;

        let before = history.memory.len() + history.latency.len();
        history
            .memory
            .retain(|r| now.saturating_duration_since(r.at) < retention);
        history
            .latency
            .retain(|r| now.saturating_duration_since(r.at) < retention);
        let removed = before - history.memory.len() - history.latency.len();

        if removed > 0 {
            debug!(removed, "Dropped old metric samples");
        }
        removed
    }

    // == Health ==
    /// Judges the latest samples against the configured thresholds.
    pub async fn health_status(&self) -> HealthStatus {
        let config = &self.inner.config;
        let history = self.inner.history.read().await;
        let mut status = HealthState::Healthy;
        let mut issues = Vec::new();

        if let Some(memory) = history.memory.back() {
            let ratio = memory.sample.usage_ratio();
            if ratio > config.critical_memory_threshold {
                issues.push("High memory usage".to_string());
                status = HealthState::Critical;
            } else if ratio > config.elevated_memory_threshold {
                issues.push("Elevated memory usage".to_string());
                status = HealthState::Unhealthy;
            }
        }

        if let Some(latency) = history.latency.back() {
            if latency.latency_ms > config.critical_latency_threshold.as_millis() as u64 {
                issues.push("High latency".to_string());
                if status != HealthState::Critical {
                    status = HealthState::Unhealthy;
                }
            }
        }

        if history.connected == Some(false) {
            issues.push("Connection issues".to_string());
            status = HealthState::Critical;
        }

        HealthStatus { status, issues }
    }

    /// Evaluates health, emits degradations and recovers when critical.
    pub async fn check_health(&self) -> HealthStatus {
        let health = self.health_status().await;

        match health.status {
            HealthState::Healthy => {}
            HealthState::Unhealthy => {
                warn!(issues = ?health.issues, "Health check failed");
                self.emit(MonitorEvent::Unhealthy(health.clone()));
            }
            HealthState::Critical => {
                error!(issues = ?health.issues, "Critical state");
                self.emit(MonitorEvent::Critical(health.clone()));
                if self.inner.config.auto_recovery {
                    self.attempt_recovery().await;
                }
            }
        }

        health
    }

    /// Runs every recovery action, samples again and requests a restart if
    /// the process is still critical. Returns the health after recovery.
    pub async fn attempt_recovery(&self) -> HealthStatus {
        info!("Attempting automatic recovery");

        let actions: Vec<Arc<dyn RecoveryAction>> = self.inner.recovery.read().await.clone();
        for action in actions {
            match action.recover().await {
                Ok(()) => info!(action = action.name(), "Recovery action completed"),
                Err(err) => error!(action = action.name(), error = %err, "Recovery action failed"),
            }
        }

        if self.collect_metrics().await.is_err() {
            warn!("Could not resample after recovery");
        }

        let health = self.health_status().await;
        if health.is_critical() {
            warn!(issues = ?health.issues, "Recovery failed, requesting restart");
            self.emit(MonitorEvent::RestartRequested(health.clone()));
        }
        health
    }

    // == Reporting ==
    pub async fn latest_metrics(&self) -> MetricsSnapshot {
        let history = self.inner.history.read().await;
        MetricsSnapshot {
            uptime_ms: self.inner.started.elapsed().as_millis() as u64,
            commands_executed: self.inner.commands_executed.load(Ordering::Relaxed),
            messages_processed: self.inner.messages_processed.load(Ordering::Relaxed),
            errors: self.inner.errors.load(Ordering::Relaxed),
            latest_memory: history.memory.back().cloned(),
            latest_latency: history.latency.back().cloned(),
            average_latency_ms: history.average_latency(),
            memory_trend: history.memory_trend(),
        }
    }

    pub async fn report(&self) -> Report {
        Report {
            metrics: self.latest_metrics().await,
            health: self.health_status().await,
            system: SystemInfo::current(),
        }
    }

    // == Lifecycle ==
    /// Spawns the collection loop and the retention sweep. Calling it again
    /// while running, or after destroy, does nothing.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context.
    pub async fn start(&self) {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return;
        }

        let mut tasks = self.inner.tasks.lock().await;
        if !tasks.is_empty() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        tasks.push(spawn_loop(weak.clone(), self.inner.config.collect_interval, |monitor| async move {
            // Errors are already logged by collect_metrics
            let _ = monitor.collect_metrics().await;
            monitor.check_health().await;
        }));
        tasks.push(spawn_loop(weak, self.inner.config.retention_sweep_interval, |monitor| async move {
            monitor.cleanup_old_metrics().await;
        }));

        info!(
            interval_ms = self.inner.config.collect_interval.as_millis() as u64,
            "Performance monitoring started"
        );
    }

    /// Stops the background tasks. Idempotent.
    pub async fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        for handle in self.inner.tasks.lock().await.drain(..) {
            handle.abort();
        }
        info!("Performance monitor stopped");
    }
}

/// Runs `tick` every `interval` while the monitor is alive.
fn spawn_loop<F, Fut>(inner: Weak<Inner>, interval: Duration, tick: F) -> AbortHandle
where
    F: Fn(PerformanceMonitor) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let interval = tick_period(interval);
    let handle = tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let Some(inner) = inner.upgrade() else {
                break;
            };
            tick(PerformanceMonitor { inner }).await;
        }
    });
    handle.abort_handle()
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
