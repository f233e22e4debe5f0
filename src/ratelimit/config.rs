//! Limiter configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use super::RateLimitWindow;

/// Maps a caller identity and request context to the bucket key.
pub type KeyGenerator = Arc<dyn Fn(&str, &Value) -> String + Send + Sync>;

/// Side effect invoked once for every blocked call.
pub type LimitCallback = Arc<dyn Fn(&str, &RateLimitWindow, &Value) + Send + Sync>;

/// Settings for a single [`RateLimiter`](super::RateLimiter).
#[derive(Clone)]
pub struct LimiterConfig {
    /// Window length. Default: 60 seconds.
    pub window: Duration,
    /// Requests allowed per key and window. Default: 10.
    pub max_requests: u32,
    /// Key derivation. Default: the identifier itself.
    pub key_generator: KeyGenerator,
    /// Called with the bucket key, its window and the context when a call is blocked.
    pub on_limit_reached: LimitCallback,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 10,
            key_generator: Arc::new(|identifier, _| identifier.to_string()),
            on_limit_reached: Arc::new(|key, window, _| {
                warn!(key, count = window.count, "Rate limit reached");
            }),
        }
    }
}

impl LimiterConfig {
    /// Config with the given window and threshold and default callbacks.
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            ..Self::default()
        }
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Replace the key derivation function.
    pub fn key_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&str, &Value) -> String + Send + Sync + 'static,
    {
        self.key_generator = Arc::new(generator);
        self
    }

    /// Bucket keys become `<prefix><identifier>`.
    pub fn with_key_prefix(self, prefix: &str) -> Self {
        let prefix = prefix.to_string();
        self.key_generator(move |identifier, _| format!("{prefix}{identifier}"))
    }

    /// Replace the blocked-call callback.
    pub fn on_limit_reached<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &RateLimitWindow, &Value) + Send + Sync + 'static,
    {
        self.on_limit_reached = Arc::new(callback);
        self
    }
}

impl fmt::Debug for LimiterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimiterConfig")
            .field("window", &self.window)
            .field("max_requests", &self.max_requests)
            .finish_non_exhaustive()
    }
}
