//! Single-shot HTTP GET with redirect following, browser-like headers, title
//! extraction, and challenge-page detection.

use crate::engine::{ContentType, FetchResult};
use crate::error::{ErrorCode, FetchError};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

const MAX_REDIRECTS: usize = 5;
const TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static title regex is valid")
});

static CHALLENGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)cloudflare|checking your browser|please wait|verification|captcha|attention required")
        .expect("static challenge regex is valid")
});

/// Extract the `<title>` text, case-insensitively and tolerant of malformed
/// markup — regex, not a full parser, on this path.
#[must_use]
pub fn extract_title(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// `true` if the lowercased body matches known bot-protection keywords.
#[must_use]
pub fn is_challenge_page(html: &str) -> bool {
    CHALLENGE_RE.is_match(html)
}

/// `true` if the `Content-Type` header value looks like HTML, ignoring any
/// `; charset=...` parameter.
#[must_use]
pub fn is_html_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|mime| mime.eq_ignore_ascii_case("text/html") || mime.eq_ignore_ascii_case("application/xhtml+xml"))
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(TIMEOUT)
            .build()
            .expect("reqwest client with static config always builds");
        Self { client }
    }

    /// Perform a single-shot GET. Returns the raw HTML; Markdown conversion,
    /// if requested, is applied by the orchestrator after a successful fetch.
    /// `timeout_override`, if set, replaces the client's default per-request
    /// timeout for this call only.
    pub async fn fetch(
        &self,
        url: &str,
        extra_headers: &[(String, String)],
        timeout_override: Option<Duration>,
    ) -> Result<FetchResult, FetchError> {
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Accept-Encoding", "gzip, deflate, br")
            .header("Referer", "https://www.google.com/")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .header("Sec-Fetch-User", "?1")
            .header("Sec-Fetch-Dest", "document")
            .header("Upgrade-Insecure-Requests", "1");

        for (key, value) in extra_headers {
            request = request.header(key, value);
        }

        if let Some(d) = timeout_override {
            request = request.timeout(d);
        }

        let response = request.send().await.map_err(|e| {
            FetchError::new(ErrorCode::HttpFallbackFailed, format!("HTTP request failed: {e}"))
                .with_source(e)
        })?;

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(FetchError::http_error(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.is_empty() && !is_html_content_type(&content_type) {
            return Err(FetchError::non_html_content(&content_type));
        }

        let body = response.text().await.map_err(|e| {
            FetchError::new(ErrorCode::HttpFallbackFailed, format!("failed to read response body: {e}"))
                .with_source(e)
        })?;

        if is_challenge_page(&body.to_lowercase()) {
            return Err(FetchError::challenge_page().with_status(status.as_u16()));
        }

        Ok(FetchResult {
            title: extract_title(&body),
            content: body,
            content_type: ContentType::Html,
            final_url,
            status_code: status.as_u16(),
            is_from_cache: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_case_insensitively() {
        let html = "<html><HEAD><TiTlE>  Hello World </TiTlE></HEAD></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Hello World"));
    }

    #[test]
    fn missing_title_is_none() {
        assert_eq!(extract_title("<html><body>x</body></html>"), None);
    }

    #[test]
    fn empty_title_is_none() {
        assert_eq!(extract_title("<html><head><title></title></head></html>"), None);
    }

    #[test]
    fn detects_challenge_keywords() {
        assert!(is_challenge_page("please wait while we check your browser. cloudflare"));
        assert!(!is_challenge_page("<html><body>hello</body></html>"));
    }

    #[tokio::test]
    async fn cheap_success_returns_title_and_body() {
        let mut server = mockito::Server::new_async().await;
        let body = "<html><head><title>T</title></head><body>x</body></html>";
        let mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(body)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new();
        let result = fetcher.fetch(&server.url(), &[], None).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.content, body);
        assert_eq!(result.title.as_deref(), Some("T"));
        assert_eq!(result.status_code, 200);
        assert!(!result.is_from_cache);
    }

    #[tokio::test]
    async fn challenge_page_fails_with_challenge_code() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_body("<html><body>Checking your browser before accessing... Cloudflare</body></html>")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new();
        let err = fetcher.fetch(&server.url(), &[], None).await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.code, ErrorCode::ChallengePage);
    }

    #[test]
    fn html_content_type_variants_are_accepted() {
        assert!(is_html_content_type("text/html"));
        assert!(is_html_content_type("text/html; charset=utf-8"));
        assert!(is_html_content_type("application/xhtml+xml"));
        assert!(!is_html_content_type("application/json"));
        assert!(!is_html_content_type("application/pdf"));
    }

    #[tokio::test]
    async fn non_html_response_fails_with_non_html_content_code() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body("%PDF-1.4")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new();
        let err = fetcher.fetch(&server.url(), &[], None).await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.code, ErrorCode::NonHtmlContent);
    }

    #[tokio::test]
    async fn non_2xx_fails_with_http_error_and_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/").with_status(503).create_async().await;

        let fetcher = HttpFetcher::new();
        let err = fetcher.fetch(&server.url(), &[], None).await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.code, ErrorCode::HttpError);
        assert_eq!(err.status_code, Some(503));
    }

    #[tokio::test]
    async fn timeout_override_is_honored_on_a_fast_response() {
        let mut server = mockito::Server::new_async().await;
        let body = "<html><head><title>T</title></head></html>";
        let mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(body)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new();
        let result = fetcher
            .fetch(&server.url(), &[], Some(Duration::from_secs(5)))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.content, body);
    }
}
