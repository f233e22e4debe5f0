//! Metrics sources.

use async_trait::async_trait;

use super::{MemorySample, Sample};
use crate::cache::Cache;

/// Produces one [`Sample`] per collection tick.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn sample(&self) -> anyhow::Result<Sample>;
}

/// Reports the cache's memory estimate against its advisory budget.
///
/// Process RSS is not observable from here and stays unset.
#[derive(Debug, Clone)]
pub struct CacheMetricsSource {
    cache: Cache,
}

impl CacheMetricsSource {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl MetricsSource for CacheMetricsSource {
    async fn sample(&self) -> anyhow::Result<Sample> {
        let used = self.cache.memory_usage().await as u64;
        let total = self.cache.config().max_memory_usage as u64;

        Ok(Sample {
            memory: Some(MemorySample {
                used_bytes: used,
                total_bytes: total,
                rss_bytes: None,
            }),
            latency_ms: None,
            connected: None,
        })
    }
}
