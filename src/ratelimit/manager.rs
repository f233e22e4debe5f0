//! Rate Limit Manager
//!
//! Named registry over independent limiters with process-wide counters.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::info;

use super::{LimiterConfig, LimiterStats, RateLimitInfo, RateLimiter};
use crate::error::{Error, Result};

// == Global Counters ==
#[derive(Debug)]
struct GlobalCounters {
    total_requests: AtomicU64,
    blocked_requests: AtomicU64,
    started: Instant,
    started_at: DateTime<Utc>,
}

/// Aggregate counters across every limiter of a manager.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GlobalStats {
    pub total_requests: u64,
    pub blocked_requests: u64,
    pub start_time: DateTime<Utc>,
    pub uptime_ms: u64,
    /// Percentage of requests that were blocked
    pub blocked_rate: f64,
}

/// Aggregate counters plus a snapshot of every limiter.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ManagerStats {
    pub global: GlobalStats,
    pub limiters: BTreeMap<String, LimiterStats>,
}

// == Rate Limit Manager ==
/// Registry of named limiters.
#[derive(Debug)]
pub struct RateLimitManager {
    limiters: RwLock<HashMap<String, RateLimiter>>,
    counters: Arc<GlobalCounters>,
}

impl Default for RateLimitManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitManager {
    pub fn new() -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
            counters: Arc::new(GlobalCounters {
                total_requests: AtomicU64::new(0),
                blocked_requests: AtomicU64::new(0),
                started: Instant::now(),
                started_at: Utc::now(),
            }),
        }
    }

    // == Registration ==
    /// Registers a limiter under `name`, replacing and destroying any
    /// previous one. Blocked calls are counted globally before the
    /// configured callback runs.
    pub async fn create_limiter(&self, name: &str, config: LimiterConfig) -> RateLimiter {
        let counters = Arc::clone(&self.counters);
        let callback = Arc::clone(&config.on_limit_reached);
        let config = config.on_limit_reached(move |key, window, context| {
            counters.blocked_requests.fetch_add(1, Ordering::Relaxed);
            callback(key, window, context);
        });

        info!(
            limiter = name,
            window_ms = config.window.as_millis() as u64,
            max_requests = config.max_requests,
            "Rate limiter created"
        );

        let limiter = RateLimiter::new(config);
        let previous = self
            .limiters
            .write()
            .await
            .insert(name.to_string(), limiter.clone());

        if let Some(previous) = previous {
            previous.destroy().await;
        }

        limiter
    }

    pub async fn limiter(&self, name: &str) -> Option<RateLimiter> {
        self.limiters.read().await.get(name).cloned()
    }

    /// Registered limiter names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.limiters.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn dispatch(&self, name: &str) -> Result<RateLimiter> {
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);
        self.limiter(name)
            .await
            .ok_or_else(|| Error::LimiterNotFound(name.to_string()))
    }

    // == Checks ==
    /// Counts a request against the named limiter without failing on block.
    pub async fn check_limit(
        &self,
        name: &str,
        identifier: &str,
        context: &Value,
    ) -> Result<RateLimitInfo> {
        let limiter = self.dispatch(name).await?;
        Ok(limiter.is_allowed(identifier, context).await)
    }

    /// Counts a request and fails with `RateLimitExceeded` when blocked.
    pub async fn consume_limit(
        &self,
        name: &str,
        identifier: &str,
        context: &Value,
    ) -> Result<RateLimitInfo> {
        let limiter = self.dispatch(name).await?;
        limiter.consume(identifier, context).await
    }

    // == Resets ==
    /// Resets one identifier, or the whole limiter when `identifier` is None.
    ///
    /// Returns false for an unknown limiter or an identifier with no window.
    pub async fn reset_limiter(&self, name: &str, identifier: Option<&str>) -> bool {
        let Some(limiter) = self.limiter(name).await else {
            return false;
        };

        match identifier {
            Some(identifier) => limiter.reset(identifier).await,
            None => {
                limiter.reset_all().await;
                true
            }
        }
    }

    // == Stats ==
    pub async fn limiter_stats(&self, name: &str) -> Option<LimiterStats> {
        match self.limiter(name).await {
            Some(limiter) => Some(limiter.stats().await),
            None => None,
        }
    }

    pub fn global_stats(&self) -> GlobalStats {
        let total_requests = self.counters.total_requests.load(Ordering::Relaxed);
        let blocked_requests = self.counters.blocked_requests.load(Ordering::Relaxed);
        let blocked_rate = if total_requests > 0 {
            blocked_requests as f64 / total_requests as f64 * 100.0
        } else {
            0.0
        };

        GlobalStats {
            total_requests,
            blocked_requests,
            start_time: self.counters.started_at,
            uptime_ms: self.counters.started.elapsed().as_millis() as u64,
            blocked_rate,
        }
    }

    pub async fn stats(&self) -> ManagerStats {
        let limiters: Vec<(String, RateLimiter)> = self
            .limiters
            .read()
            .await
            .iter()
            .map(|(name, limiter)| (name.clone(), limiter.clone()))
            .collect();

        let mut snapshots = BTreeMap::new();
        for (name, limiter) in limiters {
            snapshots.insert(name, limiter.stats().await);
        }

        ManagerStats {
            global: self.global_stats(),
            limiters: snapshots,
        }
    }

    // == Destroy ==
    /// Destroys every limiter and empties the registry.
    pub async fn destroy(&self) {
        let limiters: Vec<RateLimiter> = self
            .limiters
            .write()
            .await
            .drain()
            .map(|(_, limiter)| limiter)
            .collect();

        for limiter in &limiters {
            limiter.destroy().await;
        }

        info!(count = limiters.len(), "Rate limiters destroyed");
    }
}
