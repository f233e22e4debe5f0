//! Periodic Cleanup Tasks
//!
//! Background tasks that sweep expired cache entries and stale rate-limit
//! windows, bounding memory even for keys that are never touched again.
//! Both hold weak references and stop once their target is dropped.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::tick_period;
use crate::cache::CacheStore;
use crate::ratelimit::LimiterState;

/// Spawns a background task that periodically cleans up expired cache entries.
///
/// After each sweep the memory estimate is compared against the store's
/// advisory budget and a warning is logged when it is exceeded.
///
/// # Arguments
/// * `store` - weak reference to the shared cache store
/// * `interval` - time between cleanup runs
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort it.
///
/// # Example
/// ```ignore
/// let store = Arc::new(RwLock::new(CacheStore::new(1000, Duration::from_secs(300))));
/// let cleanup_handle = spawn_cache_cleanup(Arc::downgrade(&store), Duration::from_secs(1));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cache_cleanup(store: Weak<RwLock<CacheStore>>, interval: Duration) -> JoinHandle<()> {
    let interval = tick_period(interval);
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting cache cleanup task");

        loop {
            tokio::time::sleep(interval).await;

            let Some(store) = store.upgrade() else {
                debug!("Cache dropped, stopping cleanup task");
                break;
            };

            let (removed, memory, budget) = {
                let mut guard = store.write().await;
                let removed = guard.cleanup_expired();
                (removed, guard.memory_usage(), guard.max_memory_usage())
            };

            if removed > 0 {
                info!("Cache cleanup: removed {} expired entries", removed);
            } else {
                debug!("Cache cleanup: no expired entries found");
            }

            if memory > budget {
                warn!(memory, budget, "Cache memory estimate exceeds advisory budget");
            }
        }
    })
}

/// Spawns a background task that drops rate-limit windows whose reset time
/// has passed. Runs once per window length.
pub fn spawn_limiter_cleanup(state: Weak<Mutex<LimiterState>>, interval: Duration) -> JoinHandle<()> {
    let interval = tick_period(interval);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let Some(state) = state.upgrade() else {
                break;
            };

            let removed = state.lock().await.cleanup(tokio::time::Instant::now());
            if removed > 0 {
                debug!("Rate limit cleanup: removed {} stale windows", removed);
            }
        }
    })
}
