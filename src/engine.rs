//! The `FetchEngine` capability and the data model shared by every engine.
//! Callers depend on runtime polymorphism over engine type, never a concrete
//! engine.

use crate::error::FetchError;
use async_trait::async_trait;
use serde::Serialize;

/// `FetchResult.contentType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Html,
    Markdown,
}

/// The body, provenance, and cache status of a single fetch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    pub content: String,
    pub content_type: ContentType,
    pub title: Option<String>,
    pub final_url: String,
    pub status_code: u16,
    pub is_from_cache: bool,
}

/// Point-in-time snapshot of one `BrowserInstance`'s health.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserMetrics {
    pub id: u64,
    pub created_at_secs_ago: u64,
    pub last_used_secs_ago: u64,
    pub pages_created: u64,
    pub active_pages: usize,
    pub errors: u64,
    pub is_healthy: bool,
}

/// Shared capability implemented by `HttpEngine`, `BrowserEngine`, and
/// `HybridRouter` — callers depend on this trait, never a concrete engine.
#[async_trait]
pub trait FetchEngine: Send + Sync {
    async fn fetch_content(
        &self,
        url: &str,
        opts: &crate::config::FetchOptions,
    ) -> Result<FetchResult, FetchError>;

    /// Identical contract to `fetch_content`; `opts.markdown = true` yields
    /// `content_type = Markdown`.
    async fn fetch_html(
        &self,
        url: &str,
        opts: &crate::config::FetchOptions,
    ) -> Result<FetchResult, FetchError> {
        self.fetch_content(url, opts).await
    }

    async fn metrics(&self) -> Vec<BrowserMetrics>;

    async fn cleanup(&self) -> Result<(), FetchError>;
}
