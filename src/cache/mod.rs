//! Cache Module
//!
//! Provides in-memory caching with TTL expiration and LRU eviction.

mod entry;
mod handle;
mod stats;
mod store;
mod value;


use std::time::Duration;

// Re-export public types
pub use entry::CacheEntry;
pub use handle::Cache;
pub use stats::CacheStats;
pub use store::CacheStore;
pub use value::CacheValue;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Bytes attributed to an entry's bookkeeping fields when estimating memory
pub const ENTRY_METADATA_SIZE: usize = 32;

// == Cache Config ==
/// Tuning knobs for a [`Cache`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of entries. Default: 1,000.
    pub max_size: usize,
    /// TTL applied when `set` is called without one. Default: 1 hour.
    pub default_ttl: Duration,
    /// Interval of the background expiry sweep. Default: 5 minutes.
    pub cleanup_interval: Duration,
    /// Advisory memory budget in bytes, reported but never enforced. Default: 100 MB.
    pub max_memory_usage: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(300),
            max_memory_usage: 100 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    /// Create a new config with the library defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the TTL used when none is given. `Duration::ZERO` disables expiry.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the background sweep interval.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the advisory memory budget.
    pub fn max_memory_usage(mut self, bytes: usize) -> Self {
        self.max_memory_usage = bytes;
        self
    }
}
