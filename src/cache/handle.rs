//! Shared Cache Handle
//!
//! [`Cache`] wraps a [`CacheStore`] in `Arc<RwLock<..>>`, attaches per-entry
//! expiry timers and runs the periodic cleanup task. Clones share the same
//! store; `destroy` tears everything down explicitly.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::AbortHandle;
use tracing::{info, warn};

use crate::cache::{CacheConfig, CacheStats, CacheStore, CacheValue};
use crate::tasks::{spawn_cache_cleanup, spawn_expiry_timer};

// == Cache ==
/// Thread-safe cache handle with TTL timers and background cleanup.
#[derive(Clone)]
pub struct Cache {
    shared: Arc<Shared>,
}

struct Shared {
    store: Arc<RwLock<CacheStore>>,
    config: CacheConfig,
    cleanup: Mutex<Option<AbortHandle>>,
    destroyed: AtomicBool,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup.get_mut().take() {
            handle.abort();
        }
    }
}

impl Cache {
    // == Constructor ==
    /// Creates a cache and starts its periodic cleanup task.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context.
    pub fn new(config: CacheConfig) -> Self {
        let store = Arc::new(RwLock::new(CacheStore::with_config(&config)));
        let cleanup = spawn_cache_cleanup(Arc::downgrade(&store), config.cleanup_interval);

        Self {
            shared: Arc::new(Shared {
                store,
                config,
                cleanup: Mutex::new(Some(cleanup.abort_handle())),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    // == Set ==
    /// Stores a value, replacing any previous entry and its timer.
    ///
    /// `ttl` of None uses the configured default; `Duration::ZERO` never expires.
    /// Returns `false` if the write could not be completed.
    pub async fn set(&self, key: &str, value: impl Into<CacheValue>, ttl: Option<Duration>) -> bool {
        let mut store = self.shared.store.write().await;
        self.set_locked(&mut store, key, value.into(), ttl)
    }

    fn set_locked(
        &self,
        store: &mut CacheStore,
        key: &str,
        value: CacheValue,
        ttl: Option<Duration>,
    ) -> bool {
        if self.is_destroyed() {
            warn!(key, "Cache set rejected: cache destroyed");
            return false;
        }

        let Some(insertion) = store.insert(key, value, ttl) else {
            return false;
        };

        if !insertion.ttl.is_zero() {
            let timer = spawn_expiry_timer(
                Arc::downgrade(&self.shared.store),
                key.to_string(),
                insertion.generation,
                insertion.ttl,
            );
            store.arm_timer(key, insertion.generation, timer);
        }

        true
    }

    // == Get ==
    /// Returns the value under `key` if present and unexpired.
    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        self.shared.store.write().await.get(key)
    }

    /// Checks presence without touching access metadata or statistics.
    pub async fn has(&self, key: &str) -> bool {
        self.shared.store.read().await.has(key)
    }

    /// Removes `key` and cancels its timer. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> bool {
        self.shared.store.write().await.delete(key)
    }

    /// Cancels every timer, empties the store and rolls the counters over.
    pub async fn clear(&self) {
        self.shared.store.write().await.clear();
    }

    /// Removes expired entries now; returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        self.shared.store.write().await.cleanup_expired()
    }

    /// Evicts the least recently accessed entry.
    pub async fn evict_lru(&self) -> Option<String> {
        self.shared.store.write().await.evict_lru()
    }

    // == Get Or Set ==
    /// Returns the cached value, or runs `producer`, caches and returns its result.
    ///
    /// Producer errors are returned unchanged and nothing is cached. The
    /// store lock is not held while the producer runs.
    pub async fn get_or_set<F, Fut, V, E>(
        &self,
        key: &str,
        producer: F,
        ttl: Option<Duration>,
    ) -> Result<CacheValue, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        V: Into<CacheValue>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let value: CacheValue = producer().await?.into();
        self.set(key, value.clone(), ttl).await;
        Ok(value)
    }

    // == Bulk Operations ==
    /// Gets several keys; only hits appear in the result.
    pub async fn mget<K: AsRef<str>>(&self, keys: &[K]) -> HashMap<String, CacheValue> {
        self.shared.store.write().await.mget(keys)
    }

    /// Sets several entries with a shared TTL; reports each outcome.
    pub async fn mset<I, K, V>(&self, entries: I, ttl: Option<Duration>) -> HashMap<String, bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<CacheValue>,
    {
        let mut store = self.shared.store.write().await;
        entries
            .into_iter()
            .map(|(key, value)| {
                let key = key.into();
                let stored = self.set_locked(&mut store, &key, value.into(), ttl);
                (key, stored)
            })
            .collect()
    }

    // == Stats ==
    pub async fn stats(&self) -> CacheStats {
        self.shared.store.read().await.stats()
    }

    pub async fn memory_usage(&self) -> usize {
        self.shared.store.read().await.memory_usage()
    }

    pub async fn len(&self) -> usize {
        self.shared.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.shared.store.read().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.shared.store.read().await.keys()
    }

    pub async fn values(&self) -> Vec<CacheValue> {
        self.shared.store.read().await.values()
    }

    pub async fn entries(&self) -> Vec<(String, CacheValue)> {
        self.shared.store.read().await.entries()
    }

    // == Destroy ==
    /// Stops the cleanup task and clears the store. Idempotent.
    ///
    /// After destruction writes are rejected and reads see an empty cache.
    pub async fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.shared.cleanup.lock().await.take() {
            handle.abort();
        }

        self.shared.store.write().await.clear();
        info!("Cache destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.shared.config)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn test_cache(max_size: usize) -> Cache {
        Cache::new(CacheConfig::new().max_size(max_size))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_timer_removes_unread_entry() {
        let cache = test_cache(10);
        assert!(cache.set("k", "v", Some(Duration::from_millis(100))).await);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.is_empty().await, "Timer removes the entry without a read");
        assert_eq!(cache.stats().await.misses, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_cancels_stale_timer() {
        let cache = test_cache(10);
        cache.set("k", "old", Some(Duration::from_millis(100))).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        cache.set("k", "new", Some(Duration::from_millis(500))).await;

        // Past the first TTL, before the second
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.get("k").await, Some(CacheValue::from("new")));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!cache.has("k").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_expires() {
        let cache = test_cache(10);
        cache.set("k", 1, Some(Duration::ZERO)).await;

        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(cache.get("k").await, Some(CacheValue::from(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_set_runs_producer_once() {
        let cache = test_cache(10);

        let first: Result<CacheValue, std::io::Error> = cache
            .get_or_set("user:1", || async { Ok("alice") }, None)
            .await;
        assert_eq!(first.ok(), Some(CacheValue::from("alice")));

        let second: Result<CacheValue, std::io::Error> = cache
            .get_or_set("user:1", || async { Ok("bob") }, None)
            .await;
        assert_eq!(second.ok(), Some(CacheValue::from("alice")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_set_propagates_producer_error() {
        let cache = test_cache(10);

        let result: Result<CacheValue, String> = cache
            .get_or_set("user:2", || async { Err::<CacheValue, _>("lookup failed".to_string()) }, None)
            .await;

        assert_eq!(result, Err("lookup failed".to_string()));
        assert!(!cache.has("user:2").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mset_arms_timers() {
        let cache = test_cache(10);
        let results = cache
            .mset(vec![("a", 1), ("b", 2)], Some(Duration::from_millis(50)))
            .await;
        assert!(results.values().all(|stored| *stored));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_is_idempotent() {
        let cache = test_cache(10);
        cache.set("a", 1, None).await;
        cache.get("a").await;

        cache.destroy().await;
        cache.destroy().await;

        assert!(cache.is_destroyed());
        let stats = cache.stats().await;
        assert_eq!(stats.size, 0);
        assert_eq!(stats.total_operations_lifetime, 2);
        assert!(!cache.set("b", 2, None).await);
        assert_eq!(cache.get("b").await, None);
    }
}
