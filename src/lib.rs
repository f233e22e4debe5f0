//! botcore - in-process runtime pieces for a chat bot
//!
//! A TTL + LRU cache, per-user rate limiters, a plugin registry with hooks
//! and middleware chains, and a rolling performance monitor.

pub mod cache;
pub mod config;
pub mod error;
pub mod monitor;
pub mod plugins;
pub mod ratelimit;
pub mod state;
pub mod tasks;

pub use cache::{Cache, CacheConfig, CacheValue};
pub use config::Config;
pub use error::{Error, Result};
pub use monitor::{MonitorEvent, PerformanceMonitor};
pub use plugins::{Plugin, PluginManager};
pub use ratelimit::{LimiterConfig, RateLimitManager, RateLimiter};
pub use state::AppState;
