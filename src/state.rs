//! Application State
//!
//! Explicitly constructed owner of every runtime component. Built once at
//! startup from [`Config`] and torn down with [`AppState::shutdown`].

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cache::Cache;
use crate::config::Config;
use crate::monitor::{CacheMetricsSource, PerformanceMonitor};
use crate::plugins::PluginManager;
use crate::ratelimit::{
    LimiterConfig, RateLimitManager, API_LIMITER, COMMANDS_LIMITER, MESSAGES_LIMITER,
};

/// Components shared by command dispatch, monitoring and administration.
#[derive(Clone, Debug)]
pub struct AppState {
    pub cache: Cache,
    pub limits: Arc<RateLimitManager>,
    pub plugins: Arc<PluginManager>,
    pub monitor: PerformanceMonitor,
}

impl AppState {
    /// Builds every component and registers the default limiters.
    ///
    /// The monitor samples the cache and, when critical, clears it and resets
    /// the command and message limiters. It is not started here.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context.
    pub async fn from_config(config: &Config) -> Self {
        let cache = Cache::new(config.cache.clone());

        let limits = Arc::new(RateLimitManager::new());
        limits
            .create_limiter(
                COMMANDS_LIMITER,
                LimiterConfig::new(Duration::from_secs(60), config.limits.max_commands_per_minute)
                    .with_key_prefix("cmd_"),
            )
            .await;
        limits
            .create_limiter(
                MESSAGES_LIMITER,
                LimiterConfig::new(Duration::from_secs(30), config.limits.max_messages_per_window)
                    .with_key_prefix("msg_"),
            )
            .await;
        limits
            .create_limiter(
                API_LIMITER,
                LimiterConfig::new(
                    Duration::from_secs(10),
                    config.limits.max_api_requests_per_window,
                )
                .with_key_prefix("api_"),
            )
            .await;

        let monitor = PerformanceMonitor::new(
            config.monitoring.clone(),
            Arc::new(CacheMetricsSource::new(cache.clone())),
        );
        monitor.add_recovery_action(Arc::new(cache.clone())).await;
        monitor.add_recovery_action(limits.clone()).await;

        Self {
            cache,
            limits,
            plugins: Arc::new(PluginManager::new()),
            monitor,
        }
    }

    /// Tears components down: plugins, monitor, cache, then limiters.
    pub async fn shutdown(&self) {
        info!("Shutting down");

        self.plugins.destroy().await;
        self.monitor.destroy().await;
        self.cache.destroy().await;
        self.limits.destroy().await;

        info!("Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test(start_paused = true)]
    async fn test_from_config_registers_default_limiters() {
        let state = AppState::from_config(&Config::default()).await;

        assert_eq!(state.limits.names().await, vec!["api", "commands", "messages"]);

        for _ in 0..5 {
            assert_ok!(state.limits.consume_limit("api", "42", &Value::Null).await);
        }
        let err = assert_err!(state.limits.consume_limit("api", "42", &Value::Null).await);
        assert!(err.to_string().starts_with("Rate limit exceeded for api_42"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_tears_everything_down() {
        let state = AppState::from_config(&Config::default()).await;
        state.cache.set("k", 1, None).await;
        state.monitor.start().await;

        state.shutdown().await;

        assert!(state.cache.is_destroyed());
        assert!(state.cache.is_empty().await);
        assert!(state.limits.names().await.is_empty());
        assert_eq!(state.plugins.stats().await.total_plugins, 0);
    }
}
