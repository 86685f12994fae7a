//! Decides which sub-requests a browser page should abort.
//!
//! Installed on every context's routes via CDP fetch-domain interception
//! (`browser_setup`/`browser_pool`) — a route-setup failure must never fail
//! the fetch itself, so every public entry point here is infallible.

use std::collections::HashSet;

/// Resource kinds the headless library may report for a sub-request.
/// Treated as opaque strings: the canonical set is `image`, `font`, `media`,
/// `stylesheet`, `websocket`, but callers may pass whatever string the
/// chosen CDP binding emits.
pub type ResourceKind = String;

#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    blocked_domains: Vec<String>,
    blocked_kinds: HashSet<String>,
}

impl ResourceFilter {
    #[must_use]
    pub fn new(blocked_domains: Vec<String>, blocked_kinds: Vec<String>) -> Self {
        Self {
            blocked_domains,
            blocked_kinds: blocked_kinds.into_iter().collect(),
        }
    }

    /// The aggressive resource-blocking profile for `fastMode`: the
    /// configured kinds unioned with the trade-latency-for-media set.
    #[must_use]
    pub fn fast_mode_kinds(&self) -> HashSet<String> {
        let mut kinds = self.blocked_kinds.clone();
        for k in ["image", "font", "stylesheet", "media"] {
            kinds.insert(k.to_string());
        }
        kinds
    }

    /// `true` if the sub-request should be aborted.
    ///
    /// A URL-parse failure is treated as "continue" (never abort), matching
    /// the fail-silent contract above.
    #[must_use]
    pub fn should_abort(&self, url: &str, kind: &str, fast_mode: bool) -> bool {
        let host = match url::Url::parse(url) {
            Ok(parsed) => match parsed.host_str() {
                Some(h) => h.to_lowercase(),
                None => return false,
            },
            Err(_) => return false,
        };

        let domain_blocked = self
            .blocked_domains
            .iter()
            .any(|blocked| host.contains(&blocked.to_lowercase()));

        let kind_blocked = if fast_mode {
            self.fast_mode_kinds().contains(kind)
        } else {
            self.blocked_kinds.contains(kind)
        };

        domain_blocked || kind_blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_configured_domain_substring() {
        let filter = ResourceFilter::new(vec!["doubleclick".into()], vec![]);
        assert!(filter.should_abort("https://ads.doubleclick.net/x", "script", false));
        assert!(!filter.should_abort("https://example.com/x", "script", false));
    }

    #[test]
    fn blocks_configured_kind() {
        let filter = ResourceFilter::new(vec![], vec!["websocket".into()]);
        assert!(filter.should_abort("https://example.com/ws", "websocket", false));
        assert!(!filter.should_abort("https://example.com/ws", "script", false));
    }

    #[test]
    fn fast_mode_unions_media_heavy_kinds() {
        let filter = ResourceFilter::new(vec![], vec![]);
        assert!(!filter.should_abort("https://example.com/a.png", "image", false));
        assert!(filter.should_abort("https://example.com/a.png", "image", true));
        assert!(filter.should_abort("https://example.com/a.woff", "font", true));
    }

    #[test]
    fn unparseable_url_continues() {
        let filter = ResourceFilter::new(vec!["example".into()], vec!["image".into()]);
        assert!(!filter.should_abort("not a url", "image", true));
    }
}
