//! Page-level fetch: navigate, optionally simulate a human, classify the
//! response by content type.

use crate::browser_pool::BrowserPool;
use crate::config::FetchOptions;
use crate::engine::{ContentType, FetchResult};
use crate::error::{ErrorCode, FetchError};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventResponseReceived, Headers, ResourceType,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::Rng;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tracing::warn;

const DOM_CONTENT_TIMEOUT: Duration = Duration::from_secs(60);
const NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

pub struct BrowserFetcher {
    pool: Arc<BrowserPool>,
    simulate_human_behavior: bool,
}

impl BrowserFetcher {
    #[must_use]
    pub fn new(pool: Arc<BrowserPool>, simulate_human_behavior: bool) -> Self {
        Self {
            pool,
            simulate_human_behavior,
        }
    }

    /// Acquire a page, navigate, and return a classified `FetchResult`.
    /// The page is always released, even on error.
    pub async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult, FetchError> {
        // spaMode forces thorough mode so stylesheets and scripts actually load.
        let fast_mode = opts.fast_mode.unwrap_or(true) && !opts.spa_mode;

        let handle = self.pool.acquire_page(fast_mode).await?;
        let page = handle.page.clone();

        let result = self.fetch_on_page(&page, url, opts, fast_mode).await;

        self.pool.release_page(handle).await;
        result
    }

    async fn fetch_on_page(
        &self,
        page: &Page,
        url: &str,
        opts: &FetchOptions,
        fast_mode: bool,
    ) -> Result<FetchResult, FetchError> {
        let timeout = opts.timeout.unwrap_or(if opts.spa_mode {
            NETWORK_IDLE_TIMEOUT
        } else {
            DOM_CONTENT_TIMEOUT
        });

        let main_response = watch_main_document_response(page);

        tokio::time::timeout(timeout, page.goto(url))
            .await
            .map_err(|_| FetchError::new(ErrorCode::Navigation, "navigation timed out"))?
            .map_err(|e| FetchError::no_response_with_source(e))?;

        tokio::time::timeout(timeout, page.wait_for_navigation())
            .await
            .map_err(|_| FetchError::new(ErrorCode::Navigation, "navigation timed out"))?
            .map_err(|e| FetchError::new(ErrorCode::Navigation, format!("navigation failed: {e}")))?;

        let status = page_status(&main_response).await?;
        if !(200..400).contains(&status) {
            return Err(FetchError::http_error(status));
        }

        if opts.spa_mode && opts.spa_render_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(opts.spa_render_delay_ms)).await;
        }

        if self.simulate_human_behavior && !fast_mode {
            simulate_human_interaction(page).await;
        }

        let title = page.get_title().await.ok().flatten();
        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());
        let content = page
            .content()
            .await
            .map_err(|e| FetchError::new(ErrorCode::Navigation, format!("failed to read content: {e}")))?;

        let content_type = classify_content(&main_response).await;
        let (content, content_type) = apply_content_type_policy(content, content_type, opts.markdown)?;

        Ok(FetchResult {
            content,
            content_type,
            title,
            final_url,
            status_code: status,
            is_from_cache: false,
        })
    }
}

/// Status code and content-type of the most recently observed main-document
/// response, filled in by `watch_main_document_response`.
struct MainDocumentResponse {
    status: u16,
    content_type: String,
}

type MainResponseCell = Arc<StdMutex<Option<MainDocumentResponse>>>;

/// Enable the Network domain and record the status/content-type of every
/// `Document`-typed response on this page. Redirects produce more than one
/// such event for a single navigation; the last one observed before
/// navigation settles is the one that matters, so later events simply
/// overwrite earlier ones.
///
/// Route setup failures are swallowed the same way `install_resource_filter`
/// swallows them: a fetch must not fail because interception could not be
/// installed, it just falls back to treating the navigation as a plain 200.
fn watch_main_document_response(page: &Page) -> MainResponseCell {
    let cell: MainResponseCell = Arc::new(StdMutex::new(None));
    let cell_task = cell.clone();
    let page = page.clone();

    tokio::spawn(async move {
        if let Err(e) = page.execute(NetworkEnableParams::default()).await {
            warn!("network domain enable failed, assuming status 200: {e}");
            return;
        }

        let mut responses = match page.event_listener::<EventResponseReceived>().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("response listener setup failed, assuming status 200: {e}");
                return;
            }
        };

        while let Some(event) = responses.next().await {
            if event.r#type != ResourceType::Document {
                continue;
            }
            let content_type = extract_content_type(&event.response.headers)
                .unwrap_or_else(|| "text/html".to_string());
            *cell_task.lock().expect("lock poisoned") = Some(MainDocumentResponse {
                status: event.response.status as u16,
                content_type,
            });
        }
    });

    cell
}

/// Pull `content-type` out of a CDP `Headers` object, case-insensitively.
fn extract_content_type(headers: &Headers) -> Option<String> {
    headers
        .inner()
        .as_object()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .and_then(|(_, v)| v.as_str())
        .map(str::to_string)
}

/// HTTP status of the main-document response, or 200 if no `Document`
/// response was observed (e.g. `about:blank` navigations in tests).
async fn page_status(main_response: &MainResponseCell) -> Result<u16, FetchError> {
    Ok(main_response
        .lock()
        .expect("lock poisoned")
        .as_ref()
        .map_or(200, |r| r.status))
}

/// The declared MIME type of the main-document response, defaulting to
/// `text/html` when none was observed.
async fn classify_content(main_response: &MainResponseCell) -> String {
    main_response
        .lock()
        .expect("lock poisoned")
        .as_ref()
        .map_or_else(|| "text/html".to_string(), |r| r.content_type.clone())
}

fn apply_content_type_policy(
    content: String,
    mime: String,
    markdown: bool,
) -> Result<(String, ContentType), FetchError> {
    let mime = mime
        .split(';')
        .next()
        .unwrap_or(&mime)
        .trim()
        .to_lowercase();
    if markdown {
        if mime == "text/html" || mime == "application/xhtml+xml" {
            Ok((crate::markdown::html_to_markdown(&content), ContentType::Markdown))
        } else {
            Err(FetchError::new(
                ErrorCode::MarkdownConversionNonHtml,
                format!("cannot convert content-type '{mime}' to markdown"),
            ))
        }
    } else if is_text_ish(&mime) {
        Ok((content, ContentType::Html))
    } else {
        Err(FetchError::new(
            ErrorCode::UnsupportedRawContentType,
            format!("unsupported raw content-type '{mime}'"),
        ))
    }
}

fn is_text_ish(mime: &str) -> bool {
    mime.starts_with("text/")
        || mime == "application/xml"
        || mime == "application/json"
        || mime.ends_with("+xml")
        || mime == "application/javascript"
}

/// Two mouse moves and one small scroll on the lower viewport, with
/// 150-500ms pauses. Errors are swallowed — a failed simulation gesture
/// must not fail the fetch.
async fn simulate_human_interaction(page: &Page) {
    let mut rng = rand::rng();

    for _ in 0..2 {
        let x = rng.random_range(100..800);
        let y = rng.random_range(400..700);
        let script = format!(
            "window.dispatchEvent(new MouseEvent('mousemove', {{clientX: {x}, clientY: {y}}}));"
        );
        if let Err(e) = page.evaluate(script).await {
            warn!("human-behavior mouse move failed: {e}");
        }
        tokio::time::sleep(Duration::from_millis(rng.random_range(150..500))).await;
    }

    if let Err(e) = page.evaluate("window.scrollBy(0, 200);").await {
        warn!("human-behavior scroll failed: {e}");
    }
    tokio::time::sleep(Duration::from_millis(rng.random_range(150..500))).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_ish_accepts_canonical_raw_types() {
        assert!(is_text_ish("text/plain"));
        assert!(is_text_ish("application/xml"));
        assert!(is_text_ish("application/json"));
        assert!(is_text_ish("application/rss+xml"));
        assert!(is_text_ish("application/javascript"));
        assert!(!is_text_ish("image/png"));
    }

    #[test]
    fn markdown_policy_rejects_non_html() {
        let err = apply_content_type_policy("x".into(), "image/png".into(), true).unwrap_err();
        assert_eq!(err.code, ErrorCode::MarkdownConversionNonHtml);
    }

    #[test]
    fn raw_policy_rejects_binary_types() {
        let err = apply_content_type_policy("x".into(), "image/png".into(), false).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedRawContentType);
    }

    #[test]
    fn markdown_policy_ignores_charset_parameter() {
        let (_, content_type) = apply_content_type_policy(
            "<h1>Hi</h1>".into(),
            "text/html; charset=utf-8".into(),
            true,
        )
        .unwrap();
        assert_eq!(content_type, ContentType::Markdown);
    }

    #[test]
    fn markdown_policy_converts_html() {
        let (content, content_type) =
            apply_content_type_policy("<h1>Hi</h1>".into(), "text/html".into(), true).unwrap();
        assert_eq!(content_type, ContentType::Markdown);
        assert!(content.contains("# Hi"));
    }
}
