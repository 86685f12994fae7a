//! `BrowserInstance`: one running browser process, one isolated context, and
//! its open-page bookkeeping.

use crate::resource_filter::ResourceFilter;
use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::Page;
use futures::StreamExt;
use rand::Rng;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::browser_profile::BrowserProfile;
use crate::browser_setup::find_or_download_browser;

const VIEWPORT_JITTER: i32 = 40;

fn randomized_viewport() -> (u32, u32) {
    let mut rng = rand::rng();
    let dw = rng.random_range(-VIEWPORT_JITTER..=VIEWPORT_JITTER);
    let dh = rng.random_range(-VIEWPORT_JITTER..=VIEWPORT_JITTER);
    (
        (1280 + dw).max(800) as u32,
        (720 + dh).max(600) as u32,
    )
}

/// Point-in-time mutable counters for one instance. Invariant:
/// `active_pages == |pages|`.
#[derive(Debug)]
pub struct InstanceMetrics {
    pub pages_created: AtomicU64,
    pub errors: AtomicU64,
    pub is_healthy: AtomicBool,
}

impl Default for InstanceMetrics {
    fn default() -> Self {
        Self {
            pages_created: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            is_healthy: AtomicBool::new(true),
        }
    }
}

/// One long-lived browser process + its single isolated context.
pub struct BrowserInstance {
    pub id: u64,
    pub created_at: Instant,
    pub last_used_at: StdMutex<Instant>,
    pub metrics: InstanceMetrics,
    browser: Browser,
    handler: JoinHandle<()>,
    /// Ids of pages currently checked out from this instance. `CdpPage`
    /// identity is tracked by `chromiumoxide`'s own `Page::target_id`; we
    /// only need the count and membership test.
    open_pages: StdMutex<HashSet<String>>,
    profile: Option<BrowserProfile>,
}

impl BrowserInstance {
    /// Launch a new instance: browser process, one isolated context with a
    /// randomized User-Agent/viewport, and the `ResourceFilter` installed on
    /// every route.
    pub async fn launch(
        id: u64,
        headless: bool,
        proxy: Option<&crate::config::ProxyConfig>,
    ) -> Result<Self> {
        let profile = crate::browser_profile::create_unique_profile_with_prefix("hybrid_fetch_pool")
            .context("failed to create browser profile directory")?;

        let chrome_path = find_or_download_browser().await?;
        let (width, height) = randomized_viewport();

        let mut builder = BrowserConfigBuilder::default()
            .request_timeout(Duration::from_secs(30))
            .window_size(width, height)
            .user_data_dir(profile.path().to_path_buf())
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox");

        builder = if headless {
            builder.headless_mode(HeadlessMode::default())
        } else {
            builder.with_head()
        };

        if let Some(proxy) = proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy.server));
        }

        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch browser")?;

        let handler_task = tokio::task::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("browser handler error: {e:?}");
                }
            }
        });

        Ok(Self {
            id,
            created_at: Instant::now(),
            last_used_at: StdMutex::new(Instant::now()),
            metrics: InstanceMetrics::default(),
            browser,
            handler: handler_task,
            open_pages: StdMutex::new(HashSet::new()),
            profile: Some(profile),
        })
    }

    pub fn active_pages(&self) -> usize {
        self.open_pages.lock().expect("lock poisoned").len()
    }

    pub fn is_healthy(&self) -> bool {
        self.metrics.is_healthy.load(Ordering::Acquire)
    }

    pub fn mark_unhealthy(&self) {
        self.metrics.is_healthy.store(false, Ordering::Release);
    }

    pub fn touch(&self) {
        *self.last_used_at.lock().expect("lock poisoned") = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used_at.lock().expect("lock poisoned").elapsed()
    }

    /// Create a page on this instance and install the `ResourceFilter` on
    /// its routes.
    pub async fn create_page(&self, resource_filter: &ResourceFilter, fast_mode: bool) -> Result<Page> {
        let page = match self.browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                self.mark_unhealthy();
                return Err(anyhow::anyhow!("page creation failed: {e}"));
            }
        };

        install_resource_filter(&page, resource_filter.clone(), fast_mode);

        let target_id = page.target_id().inner().to_string();
        self.open_pages
            .lock()
            .expect("lock poisoned")
            .insert(target_id);
        self.metrics.pages_created.fetch_add(1, Ordering::Relaxed);
        self.touch();
        Ok(page)
    }

    /// Release a page previously created by `create_page`. A close error
    /// marks the instance unhealthy.
    pub async fn release_page(&self, page: &Page) {
        let target_id = page.target_id().inner().to_string();
        self.open_pages.lock().expect("lock poisoned").remove(&target_id);
        self.touch();

        if let Err(e) = page.close().await {
            warn!("failed to close page {target_id}: {e}");
            self.metrics.errors.fetch_add(1, Ordering::Relaxed);
            self.mark_unhealthy();
        }
    }

    /// Remove a crashed page from bookkeeping without trying to close it
    /// again.
    pub fn forget_crashed_page(&self, page: &Page) {
        let target_id = page.target_id().inner().to_string();
        self.open_pages.lock().expect("lock poisoned").remove(&target_id);
        self.metrics.errors.fetch_add(1, Ordering::Relaxed);
        self.mark_unhealthy();
    }

    /// Cheap liveness probe used by health checks.
    pub async fn probe(&self) -> bool {
        tokio::time::timeout(Duration::from_secs(1), self.browser.version())
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    pub fn is_disconnected(&self) -> bool {
        self.handler.is_finished()
    }

    pub async fn close(mut self) {
        let _ = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler.abort();
        if let Some(profile) = self.profile.take() {
            drop(profile);
        }
    }
}

/// Install abort-on-match routing for every sub-request on this page.
/// Route setup failures are swallowed: a fetch must not fail
/// because interception could not be installed.
fn install_resource_filter(page: &Page, filter: ResourceFilter, fast_mode: bool) {
    let page = page.clone();
    tokio::spawn(async move {
        let enable = chromiumoxide::cdp::browser_protocol::fetch::EnableParams::builder()
            .pattern(
                chromiumoxide::cdp::browser_protocol::fetch::RequestPattern::builder()
                    .request_stage(chromiumoxide::cdp::browser_protocol::fetch::RequestStage::Request)
                    .build(),
            )
            .build();
        if let Err(e) = page.execute(enable).await {
            info!("resource filter route setup skipped: {e}");
            return;
        }

        let mut requests = match page.event_listener::<chromiumoxide::cdp::browser_protocol::fetch::EventRequestPaused>().await {
            Ok(stream) => stream,
            Err(e) => {
                info!("resource filter route setup skipped: {e}");
                return;
            }
        };

        while let Some(event) = requests.next().await {
            let url = event.request.url.clone();
            let kind = event
                .resource_type
                .clone()
                .map(|t| format!("{t:?}").to_lowercase())
                .unwrap_or_default();

            if filter.should_abort(&url, &kind, fast_mode) {
                let _ = page
                    .execute(chromiumoxide::cdp::browser_protocol::fetch::FailRequestParams::new(
                        event.request_id.clone(),
                        chromiumoxide::cdp::network::ErrorReason::Aborted,
                    ))
                    .await;
            } else {
                let _ = page
                    .execute(chromiumoxide::cdp::browser_protocol::fetch::ContinueRequestParams::new(
                        event.request_id.clone(),
                    ))
                    .await;
            }
        }
    });
}
