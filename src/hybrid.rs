//! Top-level routing: forced browser patterns, SPA-shell detection, fallback
//! on HTTP failure.

use crate::config::{EngineConfig, FetchOptions};
use crate::engine::{BrowserMetrics, ContentType, FetchEngine, FetchResult};
use crate::error::FetchError;
use crate::retry::RetryOrchestrator;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;

static NOSCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<noscript[^>]*>").expect("static noscript regex is valid"));

static EMPTY_ROOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<div\s+id=["']?(root|app)["']?\s*>\s*</div>"#)
        .expect("static empty-root regex is valid")
});

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>\s*</title>").expect("static empty-title regex is valid"));

const SPA_SHELL_BODY_THRESHOLD: usize = 150;

/// `true` if the body looks like an un-rendered SPA shell.
/// Deliberately regex-based, tolerant of malformed markup.
#[must_use]
pub fn is_spa_shell(body: &str) -> bool {
    let has_noscript = NOSCRIPT_RE.is_match(body);
    if body.len() < SPA_SHELL_BODY_THRESHOLD && has_noscript {
        return true;
    }
    if has_noscript {
        return true;
    }
    if EMPTY_ROOT_RE.is_match(body) {
        return true;
    }
    let has_title_tag = Regex::new(r"(?is)<title[^>]*>").unwrap().is_match(body);
    if !has_title_tag || TITLE_RE.is_match(body) {
        return true;
    }
    false
}

/// Router holding one HTTP-capable path and one browser-capable path behind
/// a shared `RetryOrchestrator`.
pub struct HybridRouter {
    orchestrator: Arc<RetryOrchestrator>,
    playwright_only_patterns: Vec<Regex>,
    default_headers: Vec<(String, String)>,
}

impl HybridRouter {
    pub fn new(config: EngineConfig) -> Self {
        let playwright_only_patterns = config
            .playwright_only_patterns
            .iter()
            .filter_map(|pattern| {
                Regex::new(pattern)
                    .or_else(|_| Regex::new(&regex::escape(pattern)))
                    .ok()
            })
            .collect();

        Self {
            orchestrator: RetryOrchestrator::new(config),
            playwright_only_patterns,
            default_headers: Vec::new(),
        }
    }

    fn is_forced_browser_url(&self, url: &str) -> bool {
        self.playwright_only_patterns
            .iter()
            .any(|pattern| pattern.is_match(url))
    }

    fn merge_headers(&self, request_headers: &[(String, String)]) -> Vec<(String, String)> {
        let mut merged = self.default_headers.clone();
        for (key, value) in request_headers {
            if let Some(existing) = merged.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
                existing.1 = value.clone();
            } else {
                merged.push((key.clone(), value.clone()));
            }
        }
        merged
    }
}

#[async_trait]
impl FetchEngine for HybridRouter {
    async fn fetch_content(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult, FetchError> {
        let mut opts = opts.clone();
        opts.headers = self.merge_headers(&opts.headers);

        if self.is_forced_browser_url(url) {
            return self.orchestrator.force_browser_fetch(url, &opts).await;
        }

        let result = self.orchestrator.fetch(url, &opts).await?;

        if opts.spa_mode && result.content_type == ContentType::Html && is_spa_shell(&result.content) {
            return self.orchestrator.force_browser_fetch(url, &opts).await;
        }

        Ok(result)
    }

    async fn metrics(&self) -> Vec<BrowserMetrics> {
        self.orchestrator.metrics().await
    }

    async fn cleanup(&self) -> Result<(), FetchError> {
        self.orchestrator.cleanup().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_body_with_noscript_is_a_shell() {
        assert!(is_spa_shell("<html><noscript>x</noscript></html>"));
    }

    #[test]
    fn empty_root_div_is_a_shell() {
        let body = "<html><head><title>T</title></head><body><div id=\"root\"></div></body></html>";
        assert!(is_spa_shell(body));
    }

    #[test]
    fn missing_title_is_a_shell() {
        let body = "<html><head></head><body><div id=\"app\">hi</div></body></html>";
        assert!(is_spa_shell(body));
    }

    #[test]
    fn rendered_page_is_not_a_shell() {
        let body = "<html><head><title>Real Page</title></head><body><div id=\"root\"><p>Plenty of real content here that is definitely not a shell and has meaningful length beyond one hundred and fifty characters to pass the body-length check comfortably.</p></div></body></html>";
        assert!(!is_spa_shell(body));
    }

    #[test]
    fn forced_pattern_matches_substring() {
        let patterns = vec![Regex::new("/app/").unwrap()];
        assert!(patterns.iter().any(|p| p.is_match("https://x/app/page")));
    }
}
