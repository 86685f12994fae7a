//! The lightweight HTTP-only engine: single-shot GET with no browser involved.

use crate::cache::Cache;
use crate::config::FetchOptions;
use crate::engine::{BrowserMetrics, ContentType, FetchEngine, FetchResult};
use crate::error::FetchError;
use crate::http_fetcher::HttpFetcher;
use async_trait::async_trait;
use std::time::Duration;

pub struct HttpEngine {
    fetcher: HttpFetcher,
    cache: Cache,
}

impl HttpEngine {
    #[must_use]
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            fetcher: HttpFetcher::new(),
            cache: Cache::new(cache_ttl),
        }
    }
}

#[async_trait]
impl FetchEngine for HttpEngine {
    async fn fetch_content(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult, FetchError> {
        if let Some(hit) = self.cache.get_matching(url, opts.markdown) {
            return Ok(hit);
        }

        let mut result = self.fetcher.fetch(url, &opts.headers, opts.timeout).await?;

        if opts.markdown {
            result.content = crate::markdown::html_to_markdown(&result.content);
            result.content_type = ContentType::Markdown;
        }

        self.cache.put(url, result.clone());
        Ok(result)
    }

    async fn metrics(&self) -> Vec<BrowserMetrics> {
        Vec::new()
    }

    async fn cleanup(&self) -> Result<(), FetchError> {
        Ok(())
    }
}
