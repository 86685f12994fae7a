//! In-memory TTL cache from URL to `FetchResult`.
//!
//! No persistence, no size cap — bounded only by TTL. Uses a `dashmap`-backed
//! concurrent map rather than a mutex-guarded `HashMap`.

use crate::engine::{ContentType, FetchResult};
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct CacheEntry {
    result: FetchResult,
    timestamp: Instant,
}

/// Process-wide, per-engine cache instance.
pub struct Cache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl Cache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Returns a fresh copy of the cached result with `is_from_cache = true`,
    /// removing the entry first if it has expired.
    pub fn get(&self, url: &str) -> Option<FetchResult> {
        let expired = match self.entries.get(url) {
            Some(entry) => entry.timestamp.elapsed() >= self.ttl,
            None => return None,
        };

        if expired {
            self.entries.remove(url);
            return None;
        }

        self.entries.get(url).map(|entry| {
            let mut result = entry.result.clone();
            result.is_from_cache = true;
            result
        })
    }

    /// Like `get`, but only returns a hit whose `content_type` matches the
    /// caller's request; a mismatch is treated as a miss so the orchestrator
    /// re-fetches instead of serving stale-shaped content.
    pub fn get_matching(&self, url: &str, wants_markdown: bool) -> Option<FetchResult> {
        let hit = self.get(url)?;
        let wants = if wants_markdown {
            ContentType::Markdown
        } else {
            ContentType::Html
        };
        if hit.content_type == wants { Some(hit) } else { None }
    }

    /// No-ops when `ttl <= 0`.
    pub fn put(&self, url: impl Into<String>, result: FetchResult) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.insert(
            url.into(),
            CacheEntry {
                result,
                timestamp: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, url: &str) {
        self.entries.remove(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn sample_result(content_type: ContentType) -> FetchResult {
        FetchResult {
            content: "hello".into(),
            content_type,
            title: None,
            final_url: "https://example.com".into(),
            status_code: 200,
            is_from_cache: false,
        }
    }

    #[test]
    fn miss_on_empty_cache() {
        let cache = Cache::new(Duration::from_secs(60));
        assert!(cache.get("https://example.com").is_none());
    }

    #[test]
    fn hit_returns_copy_with_from_cache_flag() {
        let cache = Cache::new(Duration::from_secs(60));
        cache.put("https://example.com", sample_result(ContentType::Html));
        let hit = cache.get("https://example.com").unwrap();
        assert!(hit.is_from_cache);
        assert_eq!(hit.content, "hello");
    }

    #[test]
    fn expired_entry_is_removed_on_access() {
        let cache = Cache::new(Duration::from_millis(10));
        cache.put("https://example.com", sample_result(ContentType::Html));
        sleep(Duration::from_millis(30));
        assert!(cache.get("https://example.com").is_none());
        assert!(cache.entries.is_empty());
    }

    #[test]
    fn zero_ttl_never_stores() {
        let cache = Cache::new(Duration::ZERO);
        cache.put("https://example.com", sample_result(ContentType::Html));
        assert!(cache.get("https://example.com").is_none());
    }

    #[test]
    fn mismatched_content_type_is_a_miss() {
        let cache = Cache::new(Duration::from_secs(60));
        cache.put("https://example.com", sample_result(ContentType::Html));
        assert!(cache.get_matching("https://example.com", true).is_none());
        assert!(cache.get_matching("https://example.com", false).is_some());
    }
}
