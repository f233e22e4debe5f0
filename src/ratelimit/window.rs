//! Per-key windows and the mutable limiter state.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

// == Rate Limit Window ==
/// Request count for one bucket key within its current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub count: u32,
    pub window_start: Instant,
    pub reset_at: Instant,
    pub last_request_at: Instant,
}

impl RateLimitWindow {
    fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            window_start: now,
            reset_at: now + window,
            last_request_at: now,
        }
    }

    /// True while the window is still running at `now`.
    pub fn is_active_at(&self, now: Instant) -> bool {
        now < self.reset_at
    }
}

// == Rate Limit Info ==
/// Outcome of a single limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub allowed: bool,
    /// Requests left in the current window, never negative
    pub remaining: u32,
    pub reset_at: Instant,
    /// Calls counted in the current window, blocked ones included
    pub total_hits: u32,
    pub time_to_reset: Duration,
}

// == Limiter State ==
/// All windows of one limiter plus its shared reset boundary.
#[derive(Debug)]
pub struct LimiterState {
    clients: HashMap<String, RateLimitWindow>,
    reset_at: Instant,
    window: Duration,
}

impl LimiterState {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            clients: HashMap::new(),
            reset_at: now + window,
            window,
        }
    }

    /// Counts one request for `key`.
    ///
    /// Returns the outcome, plus a snapshot of the window when the request
    /// was blocked so the caller can report it after releasing the lock.
    pub fn hit(
        &mut self,
        key: &str,
        max_requests: u32,
        now: Instant,
    ) -> (RateLimitInfo, Option<RateLimitWindow>) {
        // Shared boundary: wipes every key at once
        if now >= self.reset_at {
            self.clients.clear();
            self.reset_at = now + self.window;
        }

        let window = self.window;
        let client = self
            .clients
            .entry(key.to_string())
            .or_insert_with(|| RateLimitWindow::open(now, window));

        // Per-key rolling reset
        if now >= client.reset_at {
            client.count = 0;
            client.window_start = now;
            client.reset_at = now + window;
        }

        client.last_request_at = now;
        client.count = client.count.saturating_add(1);

        let allowed = client.count <= max_requests;
        let info = RateLimitInfo {
            allowed,
            remaining: max_requests.saturating_sub(client.count),
            reset_at: client.reset_at,
            total_hits: client.count,
            time_to_reset: client.reset_at.saturating_duration_since(now),
        };

        let blocked = (!allowed).then(|| client.clone());
        (info, blocked)
    }

    /// Drops the window for `key`. Returns whether one existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.clients.remove(key).is_some()
    }

    /// Drops every window and restarts the shared boundary from `now`.
    pub fn reset_all(&mut self, now: Instant) {
        self.clients.clear();
        self.reset_at = now + self.window;
    }

    /// Drops windows whose reset instant has passed. Returns how many.
    pub fn cleanup(&mut self, now: Instant) -> usize {
        let before = self.clients.len();
        self.clients.retain(|_, client| client.is_active_at(now));
        before - self.clients.len()
    }

    /// Clears every window without touching the shared boundary.
    pub fn clear(&mut self) {
        self.clients.clear();
    }

    pub fn get(&self, key: &str) -> Option<&RateLimitWindow> {
        self.clients.get(key)
    }

    pub fn windows(&self) -> impl Iterator<Item = (&String, &RateLimitWindow)> {
        self.clients.iter()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// The shared boundary at which all windows are wiped.
    pub fn reset_at(&self) -> Instant {
        self.reset_at
    }
}
