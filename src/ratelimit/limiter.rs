//! Rate Limiter
//!
//! Enforces "at most N requests per key per window" for one limiter
//! instance. State sits behind an async mutex shared with the cleanup task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

use super::{LimiterConfig, LimiterState, RateLimitInfo};
use crate::error::{Error, Result};
use crate::tasks::spawn_limiter_cleanup;

// == Limiter Stats ==
/// Snapshot of a limiter's clients and parameters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LimiterStats {
    /// Keys currently tracked
    pub total_clients: usize,
    /// Keys whose window is still running
    pub active_clients: usize,
    /// Active keys over the threshold
    pub blocked_clients: usize,
    pub window_ms: u64,
    pub max_requests: u32,
    /// Next shared reset, as wall-clock time
    pub reset_time: DateTime<Utc>,
}

// == Rate Limiter ==
/// Cloneable handle to a single limiter.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    config: LimiterConfig,
    state: Arc<Mutex<LimiterState>>,
    cleanup: Mutex<Option<AbortHandle>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup.get_mut().take() {
            handle.abort();
        }
    }
}

impl RateLimiter {
    /// Creates a limiter and starts its cleanup task, which runs once per window.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context.
    pub fn new(config: LimiterConfig) -> Self {
        let state = Arc::new(Mutex::new(LimiterState::new(config.window, Instant::now())));
        let cleanup = spawn_limiter_cleanup(Arc::downgrade(&state), config.window);

        Self {
            inner: Arc::new(Inner {
                config,
                state,
                cleanup: Mutex::new(Some(cleanup.abort_handle())),
            }),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.inner.config
    }

    fn key_for(&self, identifier: &str, context: &Value) -> String {
        (self.inner.config.key_generator)(identifier, context)
    }

    // == Checks ==
    /// Counts a request for `identifier` and reports whether it is allowed.
    ///
    /// Blocked requests still count, so repeated calls stay blocked until the
    /// window resets. `on_limit_reached` runs once per blocked call.
    pub async fn is_allowed(&self, identifier: &str, context: &Value) -> RateLimitInfo {
        self.hit(identifier, context).await.1
    }

    /// Like [`is_allowed`](Self::is_allowed) but fails with
    /// [`Error::RateLimitExceeded`] when the request is blocked.
    pub async fn consume(&self, identifier: &str, context: &Value) -> Result<RateLimitInfo> {
        let (key, info) = self.hit(identifier, context).await;
        if info.allowed {
            Ok(info)
        } else {
            Err(Error::RateLimitExceeded { key, info })
        }
    }

    /// Derives the key once, counts the request and returns both.
    async fn hit(&self, identifier: &str, context: &Value) -> (String, RateLimitInfo) {
        let key = self.key_for(identifier, context);
        let max_requests = self.inner.config.max_requests;

        let (info, blocked) = self
            .inner
            .state
            .lock()
            .await
            .hit(&key, max_requests, Instant::now());

        if let Some(window) = blocked {
            (self.inner.config.on_limit_reached)(&key, &window, context);
        }

        (key, info)
    }

    // == Resets ==
    /// Forgets `identifier`'s window. The key is derived with a null context.
    pub async fn reset(&self, identifier: &str) -> bool {
        let key = self.key_for(identifier, &Value::Null);
        self.inner.state.lock().await.remove(&key)
    }

    /// Forgets every window and restarts the shared boundary.
    pub async fn reset_all(&self) {
        self.inner.state.lock().await.reset_all(Instant::now());
    }

    /// Drops windows whose reset instant has passed. Returns how many.
    pub async fn cleanup(&self) -> usize {
        let removed = self.inner.state.lock().await.cleanup(Instant::now());
        if removed > 0 {
            debug!(removed, "Rate limiter cleanup");
        }
        removed
    }

    // == Stats ==
    pub async fn stats(&self) -> LimiterStats {
        let now = Instant::now();
        let state = self.inner.state.lock().await;
        let max_requests = self.inner.config.max_requests;

        let mut active_clients = 0;
        let mut blocked_clients = 0;
        for (_, window) in state.windows() {
            if window.is_active_at(now) {
                active_clients += 1;
                if window.count > max_requests {
                    blocked_clients += 1;
                }
            }
        }

        let until_reset = state.reset_at().saturating_duration_since(now);
        let reset_time = Utc::now()
            + chrono::Duration::from_std(until_reset).unwrap_or_else(|_| chrono::Duration::zero());

        LimiterStats {
            total_clients: state.len(),
            active_clients,
            blocked_clients,
            window_ms: self.inner.config.window.as_millis() as u64,
            max_requests,
            reset_time,
        }
    }

    // == Destroy ==
    /// Stops the cleanup task and drops all windows.
    pub async fn destroy(&self) {
        if let Some(handle) = self.inner.cleanup.lock().await.take() {
            handle.abort();
        }

        self.inner.state.lock().await.clear();
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn limiter(window_ms: u64, max_requests: u32) -> RateLimiter {
        RateLimiter::new(LimiterConfig::new(Duration::from_millis(window_ms), max_requests))
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_per_second_scenario() {
        let limiter = limiter(1000, 2);

        let mut results = Vec::new();
        for _ in 0..3 {
            results.push(limiter.is_allowed("u1", &Value::Null).await.allowed);
        }
        assert_eq!(results, vec![true, true, false]);

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(limiter.is_allowed("u1", &Value::Null).await.allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consume_fails_after_quota() {
        let limiter = limiter(60_000, 3);

        for _ in 0..3 {
            assert_ok!(limiter.consume("u1", &Value::Null).await);
        }

        let err = assert_err!(limiter.consume("u1", &Value::Null).await);
        match err {
            Error::RateLimitExceeded { key, info } => {
                assert_eq!(key, "u1");
                assert_eq!(info.remaining, 0);
                assert_eq!(info.total_hits, 4);
                assert_eq!(info.time_to_reset, Duration::from_secs(60));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_consume_derives_key_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let limiter = RateLimiter::new(LimiterConfig::new(Duration::from_secs(60), 1).key_generator(
            move |id, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                format!("user:{id}")
            },
        ));

        assert_ok!(limiter.consume("u1", &Value::Null).await);
        let err = assert_err!(limiter.consume("u1", &Value::Null).await);

        assert_eq!(calls.load(Ordering::SeqCst), 2, "One key derivation per call");
        assert!(matches!(err, Error::RateLimitExceeded { ref key, .. } if key == "user:u1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identifiers_are_independent() {
        let limiter = limiter(60_000, 1);

        assert_ok!(limiter.consume("u1", &Value::Null).await);
        assert_err!(limiter.consume("u1", &Value::Null).await);
        assert_ok!(limiter.consume("u2", &Value::Null).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_runs_once_per_blocked_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let limiter = RateLimiter::new(
            LimiterConfig::new(Duration::from_secs(60), 1)
                .with_key_prefix("cmd_")
                .on_limit_reached(move |key, window, _| {
                    assert_eq!(key, "cmd_u1");
                    assert!(window.count > 1);
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
        );

        for _ in 0..4 {
            limiter.is_allowed("u1", &Value::Null).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_quota() {
        let limiter = limiter(60_000, 2);
        limiter.is_allowed("u1", &Value::Null).await;
        limiter.is_allowed("u1", &Value::Null).await;

        assert!(limiter.reset("u1").await);
        assert!(!limiter.reset("u1").await);

        let info = assert_ok!(limiter.consume("u1", &Value::Null).await);
        assert_eq!(info.remaining, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_counts_blocked_clients() {
        let limiter = limiter(60_000, 1);
        limiter.is_allowed("a", &Value::Null).await;
        limiter.is_allowed("b", &Value::Null).await;
        limiter.is_allowed("b", &Value::Null).await;

        let stats = limiter.stats().await;
        assert_eq!(stats.total_clients, 2);
        assert_eq!(stats.active_clients, 2);
        assert_eq!(stats.blocked_clients, 1);
        assert_eq!(stats.window_ms, 60_000);
        assert_eq!(stats.max_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_drops_stale_windows() {
        let limiter = limiter(1000, 5);
        limiter.is_allowed("u1", &Value::Null).await;

        // Cleanup runs once per window
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(limiter.stats().await.total_clients, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_clears_windows() {
        let limiter = limiter(1000, 5);
        limiter.is_allowed("u1", &Value::Null).await;

        limiter.destroy().await;
        limiter.destroy().await;

        assert_eq!(limiter.stats().await.total_clients, 0);
    }
}
