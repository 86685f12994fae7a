//! Engine configuration: typed builder, validated ranges, sensible defaults.

use crate::error::{ErrorCode, FetchError};
use std::time::Duration;

/// Proxy configuration forwarded to the browser pool.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Process-wide configuration for a `HybridEngine` (and its inner engines).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub concurrent_pages: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub cache_ttl: Duration,
    pub use_http_fallback: bool,
    pub use_headed_mode_fallback: bool,
    pub use_headed_mode: bool,
    pub default_fast_mode: bool,
    pub simulate_human_behavior: bool,
    pub max_browsers: usize,
    pub max_pages_per_context: usize,
    pub max_browser_age: Duration,
    pub max_idle_time: Duration,
    pub health_check_interval: Duration,
    pub pool_blocked_domains: Vec<String>,
    pub pool_blocked_resource_types: Vec<String>,
    pub proxy: Option<ProxyConfig>,
    pub playwright_only_patterns: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrent_pages: 3,
            max_retries: 3,
            retry_delay: Duration::from_millis(5000),
            cache_ttl: Duration::from_secs(15 * 60),
            use_http_fallback: true,
            use_headed_mode_fallback: false,
            use_headed_mode: false,
            default_fast_mode: true,
            simulate_human_behavior: true,
            max_browsers: 2,
            max_pages_per_context: 6,
            max_browser_age: Duration::from_secs(20 * 60),
            max_idle_time: Duration::from_secs(5 * 60),
            health_check_interval: Duration::from_secs(60),
            pool_blocked_domains: Vec::new(),
            pool_blocked_resource_types: Vec::new(),
            proxy: None,
            playwright_only_patterns: Vec::new(),
        }
    }
}

/// Typed builder for `EngineConfig`, validating ranges before handing out a
/// usable config.
#[derive(Debug, Default, Clone)]
pub struct EngineConfigBuilder {
    inner: EngineConfig,
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn concurrent_pages(mut self, n: usize) -> Self {
        self.inner.concurrent_pages = n;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.inner.max_retries = n;
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, d: Duration) -> Self {
        self.inner.retry_delay = d;
        self
    }

    #[must_use]
    pub fn cache_ttl(mut self, d: Duration) -> Self {
        self.inner.cache_ttl = d;
        self
    }

    #[must_use]
    pub fn use_http_fallback(mut self, v: bool) -> Self {
        self.inner.use_http_fallback = v;
        self
    }

    #[must_use]
    pub fn use_headed_mode_fallback(mut self, v: bool) -> Self {
        self.inner.use_headed_mode_fallback = v;
        self
    }

    #[must_use]
    pub fn use_headed_mode(mut self, v: bool) -> Self {
        self.inner.use_headed_mode = v;
        self
    }

    #[must_use]
    pub fn default_fast_mode(mut self, v: bool) -> Self {
        self.inner.default_fast_mode = v;
        self
    }

    #[must_use]
    pub fn simulate_human_behavior(mut self, v: bool) -> Self {
        self.inner.simulate_human_behavior = v;
        self
    }

    #[must_use]
    pub fn max_browsers(mut self, n: usize) -> Self {
        self.inner.max_browsers = n;
        self
    }

    #[must_use]
    pub fn max_pages_per_context(mut self, n: usize) -> Self {
        self.inner.max_pages_per_context = n;
        self
    }

    #[must_use]
    pub fn max_browser_age(mut self, d: Duration) -> Self {
        self.inner.max_browser_age = d;
        self
    }

    #[must_use]
    pub fn max_idle_time(mut self, d: Duration) -> Self {
        self.inner.max_idle_time = d;
        self
    }

    #[must_use]
    pub fn health_check_interval(mut self, d: Duration) -> Self {
        self.inner.health_check_interval = d;
        self
    }

    #[must_use]
    pub fn pool_blocked_domains(mut self, domains: Vec<String>) -> Self {
        self.inner.pool_blocked_domains = domains;
        self
    }

    #[must_use]
    pub fn pool_blocked_resource_types(mut self, kinds: Vec<String>) -> Self {
        self.inner.pool_blocked_resource_types = kinds;
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.inner.proxy = Some(proxy);
        self
    }

    #[must_use]
    pub fn playwright_only_patterns(mut self, patterns: Vec<String>) -> Self {
        self.inner.playwright_only_patterns = patterns;
        self
    }

    /// Validate and produce the final config.
    pub fn build(self) -> Result<EngineConfig, FetchError> {
        let cfg = self.inner;
        if cfg.concurrent_pages == 0 {
            return Err(FetchError::new(
                ErrorCode::FetchFailed,
                "concurrent_pages must be >= 1",
            ));
        }
        if cfg.max_browsers == 0 {
            return Err(FetchError::new(
                ErrorCode::FetchFailed,
                "max_browsers must be >= 1",
            ));
        }
        if cfg.max_pages_per_context == 0 {
            return Err(FetchError::new(
                ErrorCode::FetchFailed,
                "max_pages_per_context must be >= 1",
            ));
        }
        Ok(cfg)
    }
}

/// Per-call overrides layered on top of `EngineConfig`.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub fast_mode: Option<bool>,
    pub spa_mode: bool,
    pub spa_render_delay_ms: u64,
    pub markdown: bool,
    pub headers: Vec<(String, String)>,
    /// Overrides the engine's default navigation/request timeout for this
    /// call only. Applies to both the HTTP attempt and the browser
    /// navigation attempt.
    pub timeout: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_table() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.concurrent_pages, 3);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_delay, Duration::from_millis(5000));
        assert_eq!(cfg.cache_ttl, Duration::from_secs(900));
        assert!(cfg.use_http_fallback);
        assert!(!cfg.use_headed_mode_fallback);
        assert!(cfg.default_fast_mode);
        assert!(cfg.simulate_human_behavior);
        assert_eq!(cfg.max_browsers, 2);
        assert_eq!(cfg.max_pages_per_context, 6);
    }

    #[test]
    fn fetch_options_timeout_override_defaults_to_none() {
        let opts = FetchOptions::default();
        assert_eq!(opts.timeout, None);

        let opts = FetchOptions {
            timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        assert_eq!(opts.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn builder_rejects_zero_concurrent_pages() {
        let result = EngineConfigBuilder::new().concurrent_pages(0).build();
        assert!(result.is_err());
    }
}
