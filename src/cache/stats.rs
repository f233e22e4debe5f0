//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of completed inserts
    pub sets: u64,
    /// Number of entries removed through the delete path
    pub deletes: u64,
    /// Number of entries evicted due to LRU policy, survives `clear`
    pub evictions: u64,
    /// Operations accumulated across every `clear`
    pub total_operations_lifetime: u64,
    /// Current number of entries in the cache
    pub size: usize,
    /// Hit percentage (0-100, two decimals)
    pub hit_rate: f64,
    /// Estimated bytes held by the cache
    pub memory_usage: usize,
    /// Whether the estimate is above the advisory budget
    pub memory_limit_exceeded: bool,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the hit percentage rounded to two decimals.
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate_percent(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            let percent = self.hits as f64 / total as f64 * 100.0;
            (percent * 100.0).round() / 100.0
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_set(&mut self) {
        self.sets += 1;
    }

    pub fn record_delete(&mut self) {
        self.deletes += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Roll Over ==
    /// Folds the running counters into the lifetime total and zeroes them.
    ///
    /// Evictions are kept.
    pub fn roll_over(&mut self) {
        self.total_operations_lifetime += self.hits + self.misses + self.sets + self.deletes;
        self.hits = 0;
        self.misses = 0;
        self.sets = 0;
        self.deletes = 0;
    }
}
