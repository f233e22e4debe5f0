//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use tokio::time::Instant;

use crate::cache::value::{text_size, CacheValue};
use crate::cache::ENTRY_METADATA_SIZE;
use crate::tasks::ExpiryTimer;

// == Cache Entry ==
/// Represents a single cache entry with value and access metadata.
#[derive(Debug)]
pub struct CacheEntry {
    /// The stored value
    pub value: CacheValue,
    /// Creation instant
    pub created_at: Instant,
    /// Time to live, `Duration::ZERO` = no expiration
    pub ttl: Duration,
    /// Number of successful reads
    pub access_count: u64,
    /// Instant of the last successful read (or creation)
    pub last_accessed_at: Instant,
    /// Store-wide access sequence, breaks ties between equal instants
    pub(crate) access_seq: u64,
    /// Identifies this insertion of the key; stale timers compare against it
    pub(crate) generation: u64,
    /// Pending expiry task, cancelled when the entry is dropped
    pub(crate) timer: Option<ExpiryTimer>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl` - Time to live, zero for no expiry
    pub fn new(value: CacheValue, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            ttl,
            access_count: 0,
            last_accessed_at: now,
            access_seq: 0,
            generation: 0,
            timer: None,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry stays valid while `now - created_at <= ttl`; it is expired
    /// only once strictly more than the TTL has elapsed.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Same as [`is_expired`](Self::is_expired) against a given instant.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        !self.ttl.is_zero() && now.saturating_duration_since(self.created_at) > self.ttl
    }

    // == Time To Live ==
    /// Returns the remaining TTL, or None if the entry never expires.
    ///
    /// # Returns
    /// - `Some(Duration::ZERO)` if the TTL has elapsed
    /// - `Some(remaining)` if the entry has TTL and hasn't expired
    /// - `None` if the entry has no TTL
    pub fn ttl_remaining(&self) -> Option<Duration> {
        if self.ttl.is_zero() {
            return None;
        }
        let elapsed = Instant::now().saturating_duration_since(self.created_at);
        Some(self.ttl.saturating_sub(elapsed))
    }

    // == Touch ==
    /// Records a successful read.
    pub(crate) fn touch(&mut self, now: Instant, seq: u64) {
        self.access_count += 1;
        self.last_accessed_at = now;
        self.access_seq = seq;
    }

    // == Estimated Size ==
    /// Estimates the bytes held by this entry under `key`.
    pub fn estimated_size(&self, key: &str) -> usize {
        text_size(key) + ENTRY_METADATA_SIZE + self.value.estimated_size()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new("test_value".into(), Duration::ZERO);

        assert_eq!(entry.value.as_str(), Some("test_value"));
        assert_eq!(entry.access_count, 0);
        assert!(entry.ttl_remaining().is_none());

        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert!(!entry.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expiration_is_strict() {
        let entry = CacheEntry::new("test_value".into(), Duration::from_millis(100));

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(!entry.is_expired(), "Entry is still valid at exactly its TTL");
        assert_eq!(entry.ttl_remaining(), Some(Duration::ZERO));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(entry.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_remaining() {
        let entry = CacheEntry::new("test_value".into(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(entry.ttl_remaining(), Some(Duration::from_secs(6)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_updates_metadata() {
        let mut entry = CacheEntry::new(CacheValue::from(1), Duration::ZERO);
        let created = entry.created_at;

        tokio::time::advance(Duration::from_millis(5)).await;
        entry.touch(Instant::now(), 7);

        assert_eq!(entry.access_count, 1);
        assert_eq!(entry.access_seq, 7);
        assert_eq!(entry.last_accessed_at, created + Duration::from_millis(5));
    }

    #[test]
    fn test_estimated_size_includes_key_and_metadata() {
        let entry = CacheEntry::new("abc".into(), Duration::ZERO);
        // key "k1" = 4, metadata = 32, value "abc" = 6
        assert_eq!(entry.estimated_size("k1"), 42);
    }
}
