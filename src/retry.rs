//! Per-call state machine: cache lookup, HTTP attempt, browser pool init,
//! browser attempt, fast/thorough escalation, bounded retry.
//!
//! Uses a `DashMap`-style per-host tracking pattern (here a `DashSet` of
//! hosts pinned to headed mode) and retries with a fixed delay, generalized
//! to per-call retry rather than per-domain circuit-breaking — the
//! headed-fallback host set belongs to an engine instance, not the process.

use crate::browser_fetcher::BrowserFetcher;
use crate::browser_pool::{BrowserPool, BrowserPoolConfig};
use crate::cache::Cache;
use crate::config::{EngineConfig, FetchOptions};
use crate::engine::FetchResult;
use crate::error::{ErrorCode, FetchError};
use crate::http_fetcher::HttpFetcher;
use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

pub struct RetryOrchestrator {
    config: EngineConfig,
    cache: Cache,
    http: HttpFetcher,
    pool: RwLock<Arc<BrowserPool>>,
    concurrency: Semaphore,
    /// Hosts that should use headed mode regardless of `retry_attempt` — an
    /// out-of-band signal set by a caller, not derived from retry state.
    headed_fallback_hosts: DashSet<String>,
}

impl RetryOrchestrator {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        let pool = new_pool(&config, config.use_headed_mode);
        let concurrency = Semaphore::new(config.concurrent_pages);
        Arc::new(Self {
            cache: Cache::new(config.cache_ttl),
            http: HttpFetcher::new(),
            pool: RwLock::new(pool),
            concurrency,
            headed_fallback_hosts: DashSet::new(),
            config,
        })
    }

    /// Mark a host as requiring headed mode on every subsequent fetch.
    pub fn mark_headed_fallback(&self, host: impl Into<String>) {
        self.headed_fallback_hosts.insert(host.into());
    }

    pub async fn metrics(&self) -> Vec<crate::engine::BrowserMetrics> {
        self.pool.read().await.metrics().await
    }

    pub async fn cleanup(&self) {
        self.pool.read().await.cleanup().await;
    }

    pub async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult, FetchError> {
        // Step 1: cache check, first attempt only.
        let wants_markdown = opts.markdown;
        if let Some(hit) = self.cache.get_matching(url, wants_markdown) {
            debug!("cache hit for {url}");
            return Ok(hit);
        }

        // Step 2: HTTP attempt, first attempt only, non-SPA.
        if self.config.use_http_fallback && !opts.spa_mode {
            match self.http.fetch(url, &opts.headers, opts.timeout).await {
                Ok(mut result) => {
                    if wants_markdown {
                        result.content = crate::markdown::html_to_markdown(&result.content);
                        result.content_type = crate::engine::ContentType::Markdown;
                    }
                    self.cache.put(url, result.clone());
                    return Ok(result);
                }
                Err(e) => {
                    debug!("HTTP attempt for {url} swallowed: {e}");
                }
            }
        }

        let use_headed = self.config.use_headed_mode_fallback && self.host_wants_headed(url);
        let result = self.browser_loop(url, opts, use_headed).await;

        if let Ok(ref result) = result {
            self.cache.put(url, result.clone());
        }
        result
    }

    /// Skips the HTTP attempt entirely: used for forced-pattern and
    /// SPA-shell-escalation routing.
    pub async fn force_browser_fetch(
        &self,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<FetchResult, FetchError> {
        let wants_markdown = opts.markdown;
        if let Some(hit) = self.cache.get_matching(url, wants_markdown) {
            debug!("cache hit for {url} (forced browser path)");
            return Ok(hit);
        }

        let use_headed = self.config.use_headed_mode_fallback && self.host_wants_headed(url);
        let result = self.browser_loop(url, opts, use_headed).await;

        if let Ok(ref result) = result {
            self.cache.put(url, result.clone());
        }
        result
    }

    fn host_wants_headed(&self, url: &str) -> bool {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .is_some_and(|host| self.headed_fallback_hosts.contains(&host))
    }

    /// Steps 3-6: pool init (bounded 1 retry), browser attempt, fast-mode
    /// escalation on the first failure, bounded retry loop.
    async fn browser_loop(
        &self,
        url: &str,
        opts: &FetchOptions,
        headed_from_start: bool,
    ) -> Result<FetchResult, FetchError> {
        self.ensure_pool_mode(headed_from_start).await?;

        let mut retry_attempt: u32 = 0;
        let mut fast_mode = opts.fast_mode.unwrap_or(self.config.default_fast_mode);
        let mut escalated = false;
        let mut last_error: Option<FetchError> = None;

        loop {
            // Switch to headed mode once the retry count crosses the threshold.
            let wants_headed = headed_from_start
                || (self.config.use_headed_mode_fallback && retry_attempt >= 2);
            self.ensure_pool_mode(wants_headed).await?;

            let _permit = self
                .concurrency
                .acquire()
                .await
                .map_err(|_| FetchError::new(ErrorCode::QueueNoResult, "concurrency semaphore closed"))?;

            let mut call_opts = opts.clone();
            call_opts.fast_mode = Some(fast_mode);

            let pool = self.pool.read().await.clone();
            let fetcher = BrowserFetcher::new(pool, self.config.simulate_human_behavior);
            let attempt = fetcher.fetch(url, &call_opts).await;
            drop(_permit);

            match attempt {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!("browser attempt for {url} failed (retry {retry_attempt}): {e}");

                    // Step 5: escalate fast -> thorough on the very first
                    // failure of the first overall attempt, no delay counted.
                    if !escalated && fast_mode && retry_attempt == 0 {
                        escalated = true;
                        fast_mode = false;
                        last_error = Some(e);
                        continue;
                    }

                    if retry_attempt < self.config.max_retries {
                        retry_attempt += 1;
                        tokio::time::sleep(self.config.retry_delay).await;
                        last_error = Some(e);
                        continue;
                    }

                    let inner = last_error.unwrap_or(e);
                    return Err(FetchError::wrap_after_retries(inner, retry_attempt));
                }
            }
        }
    }

    /// Tears down and rebuilds the pool if its headed-ness does not match
    /// what this call needs. One bounded retry on init failure.
    async fn ensure_pool_mode(&self, headed: bool) -> Result<(), FetchError> {
        // is_headless() == headed means current mode and desired mode disagree.
        let needs_rebuild = self.pool.read().await.is_headless() == headed;

        if needs_rebuild {
            let mut guard = self.pool.write().await;
            guard.cleanup().await;
            *guard = new_pool(&self.config, headed);
        }

        let pool = self.pool.read().await.clone();
        match pool.initialize().await {
            Ok(()) => Ok(()),
            Err(first_err) => {
                warn!("pool init failed, retrying once: {first_err}");
                tokio::time::sleep(self.config.retry_delay).await;
                pool.initialize().await.map_err(|_| {
                    FetchError::new(ErrorCode::PoolInitFailed, "browser pool failed to initialize")
                })
            }
        }
    }
}

fn new_pool(config: &EngineConfig, headed: bool) -> Arc<BrowserPool> {
    BrowserPool::new(BrowserPoolConfig {
        max_browsers: config.max_browsers,
        max_pages_per_context: config.max_pages_per_context,
        max_browser_age: config.max_browser_age,
        max_idle_time: config.max_idle_time,
        health_check_interval: config.health_check_interval,
        headless: !headed,
        proxy: config.proxy.clone(),
        resource_filter: crate::resource_filter::ResourceFilter::new(
            config.pool_blocked_domains.clone(),
            config.pool_blocked_resource_types.clone(),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headed_fallback_host_tracking() {
        let config = EngineConfig::default();
        let orchestrator_hosts: DashSet<String> = DashSet::new();
        orchestrator_hosts.insert("example.com".to_string());
        assert!(orchestrator_hosts.contains("example.com"));
        assert!(!orchestrator_hosts.contains("other.com"));
        let _ = config;
    }

    #[test]
    fn retry_delay_defaults_match_spec() {
        let config = EngineConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(5000));
    }
}
