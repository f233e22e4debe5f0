//! Background Tasks Module
//!
//! Contains background tasks that run periodically during operation.
//!
//! # Tasks
//! - Expiry timers: remove a single cache entry once its TTL elapses
//! - Cache cleanup: sweeps expired cache entries at the configured interval
//! - Limiter cleanup: drops stale rate-limit windows once per window
//! - Health check: logs component stats and trims the cache under memory pressure

use std::time::Duration;

mod cleanup;
mod expiry;
mod health;

pub use cleanup::{spawn_cache_cleanup, spawn_limiter_cleanup};
pub use expiry::{spawn_expiry_timer, ExpiryTimer};
pub use health::{run_health_check, spawn_health_check_task};

/// Shortest period any background loop sleeps between passes.
pub const MIN_TICK: Duration = Duration::from_millis(1);

/// Clamps a configured loop period to [`MIN_TICK`] so a zero interval
/// cannot turn a loop into a busy spin.
pub fn tick_period(interval: Duration) -> Duration {
    interval.max(MIN_TICK)
}
