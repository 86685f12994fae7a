//! End-to-end scenarios that don't require a live Chrome binary: cheap
//! success, forced pattern detection, and the Markdown path.
//! Scenarios that escalate to the browser path (challenge page, SPA shell,
//! retry exhaustion) are marked `#[ignore]` — they need an actual browser
//! process and are exercised manually / in an environment with Chrome
//! installed.

use hybrid_fetch::config::{EngineConfigBuilder, FetchOptions};
use hybrid_fetch::engine::{ContentType, FetchEngine};
use hybrid_fetch::hybrid::HybridRouter;

fn router_for(server_url_pattern: &str) -> HybridRouter {
    let config = EngineConfigBuilder::new()
        .use_http_fallback(true)
        .playwright_only_patterns(vec![server_url_pattern.to_string()])
        .build()
        .unwrap();
    HybridRouter::new(config)
}

#[tokio::test]
async fn cheap_success_returns_html_without_escalation() {
    let mut server = mockito::Server::new_async().await;
    let body = "<html><head><title>T</title></head><body>x</body></html>";
    let mock = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(body)
        .create_async()
        .await;

    let config = EngineConfigBuilder::new().build().unwrap();
    let router = HybridRouter::new(config);
    let result = router
        .fetch_content(&server.url(), &FetchOptions::default())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(result.content, body);
    assert_eq!(result.title.as_deref(), Some("T"));
    assert_eq!(result.status_code, 200);
    assert!(!result.is_from_cache);
    assert_eq!(result.content_type, ContentType::Html);
}

#[tokio::test]
async fn markdown_path_converts_html_to_markdown() {
    let mut server = mockito::Server::new_async().await;
    let body = "<h1>Hi</h1><p>Bye</p>";
    let mock = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(body)
        .create_async()
        .await;

    let config = EngineConfigBuilder::new().build().unwrap();
    let router = HybridRouter::new(config);
    let opts = FetchOptions {
        markdown: true,
        ..Default::default()
    };
    let result = router.fetch_content(&server.url(), &opts).await.unwrap();

    mock.assert_async().await;
    assert_eq!(result.content_type, ContentType::Markdown);
    assert!(result.content.contains("# Hi"));
    assert!(result.content.contains("Bye"));
    assert!(!result.content.contains("<h1>"));
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium to be installed - exercises the browser escalation path"]
async fn challenge_page_escalates_to_browser_path() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/")
        .with_status(200)
        .with_body("<html><body>Checking your browser. Cloudflare</body></html>")
        .create_async()
        .await;

    let config = EngineConfigBuilder::new().build().unwrap();
    let router = HybridRouter::new(config);
    let result = router
        .fetch_content(&server.url(), &FetchOptions::default())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(result.title.as_deref(), Some("Real"));
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium to be installed - exercises the browser escalation path"]
async fn spa_shell_escalates_even_on_http_200() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/")
        .with_status(200)
        .with_body("<html><head></head><body><div id=\"root\"></div></body></html>")
        .create_async()
        .await;

    let config = EngineConfigBuilder::new().build().unwrap();
    let router = HybridRouter::new(config);
    let opts = FetchOptions {
        spa_mode: true,
        ..Default::default()
    };
    let _ = router.fetch_content(&server.url(), &opts).await;
    mock.assert_async().await;
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium to be installed - exercises the browser escalation path"]
async fn retry_exhaustion_wraps_error_after_n_retries() {
    let config = EngineConfigBuilder::new()
        .max_retries(2)
        .retry_delay(std::time::Duration::from_millis(10))
        .use_http_fallback(false)
        .build()
        .unwrap();
    let router = HybridRouter::new(config);

    let err = router
        .fetch_content("https://127.0.0.1:1/does-not-resolve", &FetchOptions::default())
        .await
        .unwrap_err();

    assert!(err.message.starts_with("Fetch failed after 2 retries:"));
}

#[test]
fn router_with_forced_patterns_constructs_cleanly() {
    let _router = router_for("/app/");
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium to be installed - exercises the forced browser path"]
async fn forced_pattern_skips_http_attempt() {
    let mut server = mockito::Server::new_async().await;
    // No mock registered for "/app/page" — if the router attempted HTTP
    // first, mockito would return a connection/404 failure instead of
    // reaching the browser path.
    let config = EngineConfigBuilder::new()
        .playwright_only_patterns(vec!["/app/".to_string()])
        .build()
        .unwrap();
    let router = HybridRouter::new(config);
    let url = format!("{}/app/page", server.url());
    let _ = router.fetch_content(&url, &FetchOptions::default()).await;
}
