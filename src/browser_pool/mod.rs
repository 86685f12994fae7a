//! Managed pool of long-lived browser instances: health checks, lifetime
//! bounds, page-level concurrency limits, and serialized page acquisition.
//!
//! Structurally this is a pre-warmed pool of browser processes, generalized
//! from a flat deque of interchangeable browsers to a set of
//! `BrowserInstance`s that each host multiple pages, since allocation here
//! hands out *pages*, not whole browsers, per fetch.

pub mod instance;

use crate::config::ProxyConfig;
use crate::engine::BrowserMetrics;
use crate::error::{ErrorCode, FetchError};
use crate::resource_filter::ResourceFilter;
use chromiumoxide::Page;
use instance::BrowserInstance;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct BrowserPoolConfig {
    pub max_browsers: usize,
    pub max_pages_per_context: usize,
    pub max_browser_age: Duration,
    pub max_idle_time: Duration,
    pub health_check_interval: Duration,
    pub headless: bool,
    pub proxy: Option<ProxyConfig>,
    pub resource_filter: ResourceFilter,
}

/// A page handle checked out from the pool. Release it with
/// `BrowserPool::release_page` when the fetch is done.
pub struct PageHandle {
    pub page: Page,
    instance_id: u64,
}

pub struct BrowserPool {
    config: BrowserPoolConfig,
    instances: RwLock<Vec<Arc<BrowserInstance>>>,
    /// Single-slot acquisition queue: atomic w.r.t. "choose-or-create an
    /// instance, then create a page on it".
    acquisition_lock: Mutex<()>,
    next_instance_id: AtomicU64,
    is_shutting_down: AtomicBool,
    health_timer: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BrowserPool {
    #[must_use]
    pub fn new(config: BrowserPoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            instances: RwLock::new(Vec::new()),
            acquisition_lock: Mutex::new(()),
            next_instance_id: AtomicU64::new(0),
            is_shutting_down: AtomicBool::new(false),
            health_timer: Mutex::new(None),
        })
    }

    /// Idempotent: ensures at least one instance and starts the health timer.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), FetchError> {
        if self.health_timer.lock().await.is_some() {
            return Ok(());
        }

        match crate::browser_profile::cleanup_stale_profiles() {
            Ok(cleaned) if cleaned > 0 => info!("swept {cleaned} stale browser profile directories"),
            Ok(_) => {}
            Err(e) => warn!("stale profile sweep failed: {e}"),
        }

        self.ensure_minimum_instances().await?;

        let pool = Arc::clone(self);
        let handle = tokio::spawn(async move {
            health_check_loop(pool).await;
        });
        *self.health_timer.lock().await = Some(handle);
        Ok(())
    }

    async fn ensure_minimum_instances(self: &Arc<Self>) -> Result<(), FetchError> {
        if self.is_shutting_down.load(Ordering::Acquire) {
            return Ok(());
        }
        let has_healthy = self
            .instances
            .read()
            .await
            .iter()
            .any(|i| i.is_healthy());
        if has_healthy {
            return Ok(());
        }
        self.launch_instance().await.map(|_| ())
    }

    async fn launch_instance(self: &Arc<Self>) -> Result<Arc<BrowserInstance>, FetchError> {
        let id = self.next_instance_id.fetch_add(1, Ordering::Relaxed);
        let instance = BrowserInstance::launch(id, self.config.headless, self.config.proxy.as_ref())
            .await
            .map_err(|e| {
                FetchError::new(ErrorCode::PoolInitFailed, format!("failed to launch browser instance: {e}"))
            })?;
        let instance = Arc::new(instance);
        self.instances.write().await.push(Arc::clone(&instance));
        info!("launched browser instance {id}");
        Ok(instance)
    }

    /// Serialized: select the healthy instance with the fewest open pages
    /// below `max_pages_per_context`, or create a new instance if under
    /// `max_browsers`, or fail with `ERR_POOL_UNAVAILABLE`.
    pub async fn acquire_page(self: &Arc<Self>, fast_mode: bool) -> Result<PageHandle, FetchError> {
        let _guard = self.acquisition_lock.lock().await;

        if self.is_shutting_down.load(Ordering::Acquire) {
            return Err(FetchError::pool_unavailable());
        }

        let chosen = {
            let instances = self.instances.read().await;
            instances
                .iter()
                .filter(|i| i.is_healthy() && i.active_pages() < self.config.max_pages_per_context)
                .min_by_key(|i| i.active_pages())
                .cloned()
        };

        let instance = match chosen {
            Some(instance) => instance,
            None => {
                let count = self.instances.read().await.len();
                if count < self.config.max_browsers {
                    self.launch_instance().await?
                } else {
                    return Err(FetchError::pool_unavailable());
                }
            }
        };

        let page = instance
            .create_page(&self.config.resource_filter, fast_mode)
            .await
            .map_err(|e| {
                FetchError::new(ErrorCode::PoolUnavailable, format!("failed to create page: {e}"))
            })?;

        Ok(PageHandle {
            page,
            instance_id: instance.id,
        })
    }

    /// Locate the owning instance and close the page.
    pub async fn release_page(self: &Arc<Self>, handle: PageHandle) {
        let owner = self
            .instances
            .read()
            .await
            .iter()
            .find(|i| i.id == handle.instance_id)
            .cloned();

        if let Some(instance) = owner {
            instance.release_page(&handle.page).await;
        }
    }

    /// Retire instances that are disconnected, aged out, or idle-timed-out
    /// (only when pool size > 1); then ensure minimum instances.
    pub async fn health_check(self: &Arc<Self>) {
        let pool_size = self.instances.read().await.len();
        let mut to_retire = Vec::new();

        {
            let instances = self.instances.read().await;
            for instance in instances.iter() {
                let disconnected = instance.is_disconnected();
                let aged_out = instance.created_at.elapsed() > self.config.max_browser_age;
                let idle_timed_out = pool_size > 1
                    && instance.active_pages() == 0
                    && instance.idle_for() > self.config.max_idle_time;

                if disconnected || aged_out || idle_timed_out {
                    to_retire.push(Arc::clone(instance));
                    continue;
                }

                if !instance.probe().await {
                    instance.mark_unhealthy();
                    to_retire.push(Arc::clone(instance));
                }
            }
        }

        if !to_retire.is_empty() {
            let retire_ids: Vec<u64> = to_retire.iter().map(|i| i.id).collect();
            self.instances
                .write()
                .await
                .retain(|i| !retire_ids.contains(&i.id));

            for instance in to_retire {
                if let Ok(instance) = Arc::try_unwrap(instance) {
                    instance.close().await;
                } else {
                    warn!("instance still referenced at retirement; dropping handle only");
                }
            }
        }

        if let Err(e) = self.ensure_minimum_instances().await {
            warn!("failed to maintain minimum pool instances: {e}");
        }
    }

    /// Set the shutdown flag, stop the health timer, and close every
    /// instance concurrently. Idempotent.
    pub async fn cleanup(self: &Arc<Self>) {
        self.is_shutting_down.store(true, Ordering::Release);

        if let Some(handle) = self.health_timer.lock().await.take() {
            handle.abort();
        }

        let _guard = self.acquisition_lock.lock().await;
        let instances: Vec<_> = self.instances.write().await.drain(..).collect();
        let closers = instances.into_iter().map(|instance| async move {
            if let Ok(instance) = Arc::try_unwrap(instance) {
                instance.close().await;
            }
        });
        futures::future::join_all(closers).await;
        debug!("browser pool cleanup complete");
    }

    pub fn is_headless(&self) -> bool {
        self.config.headless
    }

    /// Recomputes `active_pages`/`is_healthy` from live state.
    pub async fn metrics(&self) -> Vec<BrowserMetrics> {
        self.instances
            .read()
            .await
            .iter()
            .map(|instance| BrowserMetrics {
                id: instance.id,
                created_at_secs_ago: instance.created_at.elapsed().as_secs(),
                last_used_secs_ago: instance.idle_for().as_secs(),
                pages_created: instance.metrics.pages_created.load(Ordering::Relaxed),
                active_pages: instance.active_pages(),
                errors: instance.metrics.errors.load(Ordering::Relaxed),
                is_healthy: instance.is_healthy(),
            })
            .collect()
    }
}

async fn health_check_loop(pool: Arc<BrowserPool>) {
    let mut interval = tokio::time::interval(pool.config.health_check_interval);
    loop {
        interval.tick().await;
        if pool.is_shutting_down.load(Ordering::Acquire) {
            break;
        }
        pool.health_check().await;
    }
}
