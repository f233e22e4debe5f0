//! Rate Limiting Module
//!
//! Per-identifier request windows with a pluggable key generator, and a
//! named registry that aggregates statistics across limiters.
//!
//! Each limiter combines two reset mechanisms: every key has its own rolling
//! window, and the limiter also keeps a shared boundary that wipes all keys at
//! once when it passes. The per-key window is what callers should rely on; the
//! shared wipe only bounds memory held by idle identifiers.

mod config;
mod limiter;
mod manager;
mod window;

pub use config::{KeyGenerator, LimitCallback, LimiterConfig};
pub use limiter::{LimiterStats, RateLimiter};
pub use manager::{GlobalStats, ManagerStats, RateLimitManager};
pub use window::{LimiterState, RateLimitInfo, RateLimitWindow};

// == Limiter Names ==
/// Limiter guarding command execution.
pub const COMMANDS_LIMITER: &str = "commands";

/// Limiter guarding processed messages.
pub const MESSAGES_LIMITER: &str = "messages";

/// Limiter guarding calls to external APIs.
pub const API_LIMITER: &str = "api";
