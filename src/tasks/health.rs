//! Periodic Health Check
//!
//! Logs cache and limiter statistics and sweeps the cache early when its
//! memory estimate approaches the advisory budget.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::tick_period;
use crate::state::AppState;

/// Fraction of the memory budget that triggers an early expiry sweep.
const MEMORY_PRESSURE_RATIO: f64 = 0.8;

/// Runs one health check.
///
/// Returns the number of expired entries removed when the cache was under
/// memory pressure, or None when no sweep was needed.
pub async fn run_health_check(state: &AppState) -> Option<usize> {
    let cache = state.cache.stats().await;
    let limits = state.limits.global_stats();

    info!(
        entries = cache.size,
        hit_rate = cache.hit_rate,
        memory = cache.memory_usage,
        requests = limits.total_requests,
        blocked = limits.blocked_requests,
        "Health check"
    );

    let budget = state.cache.config().max_memory_usage;
    if (cache.memory_usage as f64) <= budget as f64 * MEMORY_PRESSURE_RATIO {
        return None;
    }

    let removed = state.cache.cleanup_expired().await;
    warn!(
        memory = cache.memory_usage,
        budget, removed, "Cache memory high, swept expired entries"
    );
    Some(removed)
}

/// Spawns the health check loop.
///
/// The task owns a clone of the state; abort it before shutdown.
pub fn spawn_health_check_task(state: AppState, interval: Duration) -> JoinHandle<()> {
    let interval = tick_period(interval);
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting health check task");

        loop {
            tokio::time::sleep(interval).await;
            run_health_check(&state).await;
        }
    })
}
