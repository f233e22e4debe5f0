//! Recovery actions run when the monitor finds the process critical.

use async_trait::async_trait;
use tracing::info;

use crate::cache::Cache;
use crate::ratelimit::{RateLimitManager, COMMANDS_LIMITER, MESSAGES_LIMITER};

/// Something the monitor can do to relieve a critical state.
#[async_trait]
pub trait RecoveryAction: Send + Sync {
    fn name(&self) -> &str;

    async fn recover(&self) -> anyhow::Result<()>;
}

/// Drops every cached entry.
#[async_trait]
impl RecoveryAction for Cache {
    fn name(&self) -> &str {
        "cache"
    }

    async fn recover(&self) -> anyhow::Result<()> {
        let dropped = self.len().await;
        self.clear().await;
        info!(dropped, "Cleared cache for recovery");
        Ok(())
    }
}

/// Resets the per-user command and message limiters.
#[async_trait]
impl RecoveryAction for RateLimitManager {
    fn name(&self) -> &str {
        "rate_limits"
    }

    async fn recover(&self) -> anyhow::Result<()> {
        for name in [COMMANDS_LIMITER, MESSAGES_LIMITER] {
            if self.reset_limiter(name, None).await {
                info!(limiter = name, "Reset rate limiter for recovery");
            }
        }
        Ok(())
    }
}
