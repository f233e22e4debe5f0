//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with LRU eviction and TTL expiration.
//! The store is synchronous; timers are attached by the [`Cache`](super::Cache) handle.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{CacheConfig, CacheEntry, CacheStats, CacheValue, MAX_KEY_LENGTH};
use crate::tasks::ExpiryTimer;

/// Outcome of a successful insert, used to arm the expiry timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Insertion {
    pub generation: u64,
    pub ttl: Duration,
}

// == Cache Store ==
/// Main cache storage with LRU eviction and TTL support.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_size: usize,
    /// TTL applied when `set` is called without one
    default_ttl: Duration,
    /// Advisory memory budget in bytes
    max_memory_usage: usize,
    /// Monotonic counter ordering accesses
    access_seq: u64,
    /// Monotonic counter identifying insertions
    generation: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore with specified capacity and default TTL.
    ///
    /// # Arguments
    /// * `max_size` - Maximum number of entries the cache can hold
    /// * `default_ttl` - TTL for entries set without one, zero for no expiry
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self::with_config(&CacheConfig::new().max_size(max_size).default_ttl(default_ttl))
    }

    /// Creates a new CacheStore from a [`CacheConfig`].
    pub fn with_config(config: &CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
            max_size: config.max_size,
            default_ttl: config.default_ttl,
            max_memory_usage: config.max_memory_usage,
            access_seq: 0,
            generation: 0,
        }
    }

    // == Set ==
    /// Stores a key-value pair with optional TTL.
    ///
    /// Any previous entry under `key` is removed first. If the cache is at
    /// capacity, the least recently accessed entry is evicted.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - Optional TTL (uses default_ttl if None, `Duration::ZERO` = never expires)
    ///
    /// # Returns
    /// `false` if the insert could not be completed. The store is left untouched.
    pub fn set(&mut self, key: &str, value: impl Into<CacheValue>, ttl: Option<Duration>) -> bool {
        self.insert(key, value.into(), ttl).is_some()
    }

    pub(crate) fn insert(
        &mut self,
        key: &str,
        value: CacheValue,
        ttl: Option<Duration>,
    ) -> Option<Insertion> {
        if let Err(reason) = validate_key(key) {
            warn!(key = %truncate(key), reason, "Cache set rejected");
            return None;
        }

        if self.max_size == 0 {
            warn!(key, "Cache set rejected: store has zero capacity");
            return None;
        }

        // Drops the old entry, which cancels its pending timer
        self.remove_entry(key);

        if self.entries.len() >= self.max_size {
            self.evict_lru();
        }

        let ttl = ttl.unwrap_or(self.default_ttl);
        self.generation += 1;
        self.access_seq += 1;

        let mut entry = CacheEntry::new(value, ttl);
        entry.generation = self.generation;
        entry.access_seq = self.access_seq;

        self.entries.insert(key.to_string(), entry);
        self.stats.record_set();

        Some(Insertion {
            generation: self.generation,
            ttl,
        })
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Returns the value if found and not expired, updating its access
    /// metadata. Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &str) -> Option<CacheValue> {
        let now = Instant::now();

        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired_at(now),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.remove_entry(key);
            self.stats.record_miss();
            return None;
        }

        self.access_seq += 1;
        let seq = self.access_seq;
        let entry = self.entries.get_mut(key)?;
        entry.touch(now, seq);
        let value = entry.value.clone();

        self.stats.record_hit();
        Some(value)
    }

    // == Has ==
    /// Checks whether `key` holds an unexpired value.
    ///
    /// Does not touch access metadata or statistics; expired entries are
    /// left for the timer or the periodic sweep.
    pub fn has(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    // == Delete ==
    /// Removes an entry by key.
    ///
    /// Returns whether an entry was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.remove_entry(key).is_some()
    }

    // == Clear ==
    /// Removes every entry and rolls the running counters into the lifetime total.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats.roll_over();
    }

    // == Evict LRU ==
    /// Evicts the least recently accessed entry.
    ///
    /// Returns the evicted key, or None if the store is empty.
    pub fn evict_lru(&mut self) -> Option<String> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.last_accessed_at, entry.access_seq))
            .map(|(key, _)| key.clone())?;

        self.remove_entry(&oldest);
        self.stats.record_eviction();
        debug!(key = %oldest, "Evicted least recently used entry");
        Some(oldest)
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_entry(key);
        }

        expired_keys.len()
    }

    // == Bulk Operations ==
    /// Gets several keys; only hits appear in the result.
    pub fn mget<K: AsRef<str>>(&mut self, keys: &[K]) -> HashMap<String, CacheValue> {
        keys.iter()
            .filter_map(|key| {
                let key = key.as_ref();
                self.get(key).map(|value| (key.to_string(), value))
            })
            .collect()
    }

    /// Sets several entries with a shared TTL; reports each outcome.
    pub fn mset<I, K, V>(&mut self, entries: I, ttl: Option<Duration>) -> HashMap<String, bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<CacheValue>,
    {
        entries
            .into_iter()
            .map(|(key, value)| {
                let key = key.into();
                let stored = self.set(&key, value, ttl);
                (key, stored)
            })
            .collect()
    }

    // == Stats ==
    /// Returns a snapshot of the cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.size = self.entries.len();
        stats.hit_rate = stats.hit_rate_percent();
        stats.memory_usage = self.memory_usage();
        stats.memory_limit_exceeded = stats.memory_usage > self.max_memory_usage;
        stats
    }

    // == Memory Usage ==
    /// Estimates the bytes held by all entries. Advisory only.
    pub fn memory_usage(&self) -> usize {
        self.entries
            .iter()
            .map(|(key, entry)| entry.estimated_size(key))
            .sum()
    }

    pub fn max_memory_usage(&self) -> usize {
        self.max_memory_usage
    }

    // == Introspection ==
    /// Snapshot of the current keys, expired or not.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Snapshot of the current values, expired or not.
    pub fn values(&self) -> Vec<CacheValue> {
        self.entries.values().map(|entry| entry.value.clone()).collect()
    }

    /// Snapshot of the current key/value pairs, expired or not.
    pub fn entries(&self) -> Vec<(String, CacheValue)> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Read access to an entry's metadata without touching it.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Timer Plumbing ==
    /// Attaches an expiry timer to the insertion it was created for.
    ///
    /// If the key was replaced or removed meanwhile the timer is dropped,
    /// which cancels it.
    pub(crate) fn arm_timer(&mut self, key: &str, generation: u64, timer: ExpiryTimer) {
        if let Some(entry) = self.entries.get_mut(key) {
            if entry.generation == generation {
                entry.timer = Some(timer);
            }
        }
    }

    /// Removes `key` if it still holds the insertion identified by `generation`.
    pub(crate) fn expire_if_current(&mut self, key: &str, generation: u64) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.generation == generation => {
                // The calling task is this timer; don't abort it.
                if let Some(timer) = entry.timer.take() {
                    timer.disarm();
                }
                self.remove_entry(key);
                true
            }
            _ => false,
        }
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.stats.record_delete();
        }
        removed
    }
}

fn validate_key(key: &str) -> std::result::Result<(), &'static str> {
    if key.is_empty() {
        Err("key is empty")
    } else if key.len() > MAX_KEY_LENGTH {
        Err("key exceeds maximum length")
    } else {
        Ok(())
    }
}

fn truncate(key: &str) -> &str {
    match key.char_indices().nth(32) {
        Some((idx, _)) => &key[..idx],
        None => key,
    }
}
