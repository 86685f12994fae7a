//! The headless-browser-only engine. Thin `FetchEngine` wrapper over
//! `BrowserFetcher` + `BrowserPool` with its own cache, for callers who want
//! to skip HTTP entirely.

use crate::browser_fetcher::BrowserFetcher;
use crate::browser_pool::{BrowserPool, BrowserPoolConfig};
use crate::cache::Cache;
use crate::config::{EngineConfig, FetchOptions};
use crate::engine::{BrowserMetrics, FetchEngine, FetchResult};
use crate::error::FetchError;
use crate::resource_filter::ResourceFilter;
use async_trait::async_trait;
use std::sync::Arc;

pub struct BrowserEngine {
    pool: Arc<BrowserPool>,
    cache: Cache,
    simulate_human_behavior: bool,
}

impl BrowserEngine {
    pub fn new(config: &EngineConfig) -> Self {
        let pool = BrowserPool::new(BrowserPoolConfig {
            max_browsers: config.max_browsers,
            max_pages_per_context: config.max_pages_per_context,
            max_browser_age: config.max_browser_age,
            max_idle_time: config.max_idle_time,
            health_check_interval: config.health_check_interval,
            headless: !config.use_headed_mode,
            proxy: config.proxy.clone(),
            resource_filter: ResourceFilter::new(
                config.pool_blocked_domains.clone(),
                config.pool_blocked_resource_types.clone(),
            ),
        });
        Self {
            pool,
            cache: Cache::new(config.cache_ttl),
            simulate_human_behavior: config.simulate_human_behavior,
        }
    }
}

#[async_trait]
impl FetchEngine for BrowserEngine {
    async fn fetch_content(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult, FetchError> {
        if let Some(hit) = self.cache.get_matching(url, opts.markdown) {
            return Ok(hit);
        }

        self.pool.initialize().await?;
        let fetcher = BrowserFetcher::new(Arc::clone(&self.pool), self.simulate_human_behavior);
        let result = fetcher.fetch(url, opts).await?;

        self.cache.put(url, result.clone());
        Ok(result)
    }

    async fn metrics(&self) -> Vec<BrowserMetrics> {
        self.pool.metrics().await
    }

    async fn cleanup(&self) -> Result<(), FetchError> {
        self.pool.cleanup().await;
        Ok(())
    }
}
