//! Configuration Module
//!
//! Handles loading and managing runtime configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::monitor::MonitorConfig;

/// Per-limiter thresholds used when the host registers its default limiters.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitsConfig {
    /// Commands a user may run per 60 second window
    pub max_commands_per_minute: u32,
    /// Messages a user may send per 30 second window
    pub max_messages_per_window: u32,
    /// External API calls a user may trigger per 10 second window
    pub max_api_requests_per_window: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_commands_per_minute: 10,
            max_messages_per_window: 30,
            max_api_requests_per_window: 5,
        }
    }
}

/// Runtime configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared cache settings
    pub cache: CacheConfig,
    /// Rate limiter thresholds
    pub limits: LimitsConfig,
    /// Health monitoring settings
    pub monitoring: MonitorConfig,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_SIZE` - Maximum cache entries (default: 10000)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in milliseconds (default: 3600000)
    /// - `CACHE_MAX_MEMORY` - Advisory memory budget in bytes (default: 200 MB)
    /// - `CACHE_CLEANUP_INTERVAL` - Cleanup frequency in milliseconds (default: 300000)
    /// - `MAX_COMMANDS_PER_MINUTE` - Command limiter threshold (default: 10)
    /// - `MAX_MESSAGES_PER_WINDOW` - Message limiter threshold (default: 30)
    /// - `MAX_API_REQUESTS_PER_WINDOW` - API limiter threshold (default: 5)
    /// - `HEALTH_CHECK_INTERVAL` - Health check frequency in milliseconds (default: 300000)
    /// - `METRICS_RETENTION` - Sample retention in milliseconds (default: 3600000)
    /// - `AUTO_RECOVERY` - Set to `false` to disable automatic recovery
    /// - `CRITICAL_MEMORY_THRESHOLD` - Memory ratio considered critical (default: 0.9)
    /// - `CRITICAL_LATENCY_THRESHOLD` - Latency in milliseconds considered degraded (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cache = CacheConfig {
            max_size: env_or("CACHE_MAX_SIZE", defaults.cache.max_size),
            default_ttl: env_millis_or("CACHE_DEFAULT_TTL", defaults.cache.default_ttl),
            max_memory_usage: env_or("CACHE_MAX_MEMORY", defaults.cache.max_memory_usage),
            cleanup_interval: env_millis_or(
                "CACHE_CLEANUP_INTERVAL",
                defaults.cache.cleanup_interval,
            ),
        };

        let limits = LimitsConfig {
            max_commands_per_minute: env_or(
                "MAX_COMMANDS_PER_MINUTE",
                defaults.limits.max_commands_per_minute,
            ),
            max_messages_per_window: env_or(
                "MAX_MESSAGES_PER_WINDOW",
                defaults.limits.max_messages_per_window,
            ),
            max_api_requests_per_window: env_or(
                "MAX_API_REQUESTS_PER_WINDOW",
                defaults.limits.max_api_requests_per_window,
            ),
        };

        let monitoring = MonitorConfig {
            health_check_interval: env_millis_or(
                "HEALTH_CHECK_INTERVAL",
                defaults.monitoring.health_check_interval,
            ),
            metrics_retention: env_millis_or(
                "METRICS_RETENTION",
                defaults.monitoring.metrics_retention,
            ),
            auto_recovery: env::var("AUTO_RECOVERY")
                .map(|v| v != "false")
                .unwrap_or(defaults.monitoring.auto_recovery),
            critical_memory_threshold: env_or(
                "CRITICAL_MEMORY_THRESHOLD",
                defaults.monitoring.critical_memory_threshold,
            ),
            critical_latency_threshold: env_millis_or(
                "CRITICAL_LATENCY_THRESHOLD",
                defaults.monitoring.critical_latency_threshold,
            ),
            ..defaults.monitoring
        };

        Self {
            cache,
            limits,
            monitoring,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig {
                max_size: 10_000,
                max_memory_usage: 200 * 1024 * 1024,
                ..CacheConfig::default()
            },
            limits: LimitsConfig::default(),
            monitoring: MonitorConfig::default(),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_millis_or(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
