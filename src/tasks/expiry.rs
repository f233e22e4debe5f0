//! Per-Entry Expiry Timers
//!
//! Each cache entry with a TTL owns an [`ExpiryTimer`]. Dropping the entry
//! (overwrite, delete, eviction, clear) drops the timer, which aborts the
//! pending task. The task also re-checks the entry generation before
//! deleting, so a timer that already woke up cannot remove a newer value.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::cache::CacheStore;

// == Expiry Timer ==
/// Handle to a pending expiry task; aborts the task when dropped.
#[derive(Debug)]
pub struct ExpiryTimer {
    handle: Option<AbortHandle>,
}

impl ExpiryTimer {
    /// Releases the task without aborting it.
    pub fn disarm(mut self) {
        self.handle.take();
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Spawns a task that removes `key` from the store after `ttl`, provided
/// the key still holds the insertion identified by `generation`.
///
/// # Panics
///
/// Requires a tokio runtime context.
pub fn spawn_expiry_timer(
    store: Weak<RwLock<CacheStore>>,
    key: String,
    generation: u64,
    ttl: Duration,
) -> ExpiryTimer {
    let handle = tokio::spawn(async move {
        tokio::time::sleep(ttl).await;

        let Some(store) = store.upgrade() else {
            return;
        };

        let expired = store.write().await.expire_if_current(&key, generation);
        if expired {
            debug!(key = %key, "TTL timer removed entry");
        }
    });

    ExpiryTimer {
        handle: Some(handle.abort_handle()),
    }
}
