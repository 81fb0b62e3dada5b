//! WebFilter Engine Facade
//!
//! [`FilterEngine`] is the single choke point for shared filtering state:
//! it owns the compiled [`FilterSet`], the lazily rebuilt [`DomainIndex`],
//! the bounded [`DecisionCache`] and the running statistics counters. One
//! instance is expected per browsing session, constructed explicitly and
//! handed to the network and style pipelines by reference.
//!
//! Locking discipline: the rule/index pair sits behind one `RwLock` so a
//! query can never observe new rules with a stale index. The decision cache
//! has its own `Mutex`; it is cleared on every mutation, and a generation
//! counter keeps results computed against a pre-mutation snapshot out of
//! the post-mutation cache. Queries are pure in-memory computations;
//! nothing here suspends or performs I/O.

use std::str::Utf8Error;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use wf_core::cache::{DecisionCache, DEFAULT_CACHE_CAPACITY};
use wf_core::index::DomainIndex;
use wf_core::matcher::{Matcher, RequestInfo};
use wf_core::types::FilterSet;
use wf_compiler::parser::parse_filter_list;

pub use wf_compiler::parser::{ListStats, ParseError};
pub use wf_core::types::{CosmeticFilter, NetworkFilter, PartyMask, RequestType};

// =============================================================================
// Errors
// =============================================================================

/// Load-level failures. Per-line syntax problems are not errors; they are
/// skipped and reported through [`ListStats`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("filter list `{name}` is not valid UTF-8")]
    InvalidEncoding {
        name: String,
        #[source]
        source: Utf8Error,
    },
}

// =============================================================================
// Engine Facade
// =============================================================================

/// The built-in conservative default list. Real deployments load full
/// subscription lists on top; this keeps a bare engine useful without
/// breaking large sites.
const DEFAULT_FILTER_LIST: &str = "\
||doubleclick.net/gampad/^
||googleadservices.com/pagead/^
||googlesyndication.com/pagead/^
||amazon-adsystem.com/aax2/^
||facebook.com/tr^
||twitter.com/i/analytics^
##.ad:not(.youtube-ad)
##.ads:not(.content-ads)
##.advertisement:not(.site-content)
##.advert:not(.article-advert)
##div[id*=\"google_ads\"]:not([id*=\"youtube\"])
##div[class*=\"banner\"]:not(.site-banner)
";

/// Rules and their derived index, guarded together. `index: None` marks the
/// index dirty; it is rebuilt under the write lock before the next query.
#[derive(Debug, Default)]
struct RuleStore {
    filters: FilterSet,
    index: Option<DomainIndex>,
}

pub struct FilterEngine {
    enabled: AtomicBool,
    store: RwLock<RuleStore>,
    cache: Mutex<DecisionCache>,
    /// Bumped on every mutation, before the cache clear. An insert whose
    /// snapshot predates the current generation is discarded, so a result
    /// computed against pre-mutation rules cannot land in the cleared cache.
    store_generation: AtomicU64,
    blocked_requests: AtomicU64,
    blocked_elements: AtomicU64,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// `capacity` bounds each decision-cache map; overflowing a map clears
    /// it whole.
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            store: RwLock::new(RuleStore::default()),
            cache: Mutex::new(DecisionCache::new(capacity)),
            store_generation: AtomicU64::new(0),
            blocked_requests: AtomicU64::new(0),
            blocked_elements: AtomicU64::new(0),
        }
    }

    // =========================================================================
    // Administration
    // =========================================================================

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Toggling off keeps compiled rules and the index (cheap to re-enable)
    /// but drops the caches to bound memory. Every toggle leaves the cache
    /// cold so results cannot leak across enablement states.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::Relaxed);
        if was != enabled {
            self.invalidate_cache();
        }
    }

    /// Append the rules of one filter list. Never partially aborts on bad
    /// lines; the returned [`ListStats`] carries the parsed/error counts.
    pub fn load_filter_list(&self, name: &str, content: &[u8]) -> Result<ListStats, EngineError> {
        let text = std::str::from_utf8(content).map_err(|source| EngineError::InvalidEncoding {
            name: name.to_string(),
            source,
        })?;

        let mut store = self.write_store();
        let stats = parse_filter_list(text, &mut store.filters);
        store.index = None;
        drop(store);

        self.invalidate_cache();
        log::info!(
            "loaded filter list `{name}`: {} filters, {} errors",
            stats.parsed,
            stats.errors
        );
        Ok(stats)
    }

    /// Load the built-in conservative list.
    pub fn load_default_filter_lists(&self) -> Result<ListStats, EngineError> {
        self.load_filter_list("default", DEFAULT_FILTER_LIST.as_bytes())
    }

    /// Replace the legacy plain substring patterns. These block-only
    /// patterns predate the rule syntax and are matched case-insensitively
    /// against the whole URL.
    pub fn set_patterns(&self, patterns: &[String]) {
        let mut store = self.write_store();
        store.filters.patterns = patterns
            .iter()
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        store.index = None;
        drop(store);

        self.invalidate_cache();
    }

    /// Discard every rule. There is no per-rule removal; callers rebuild
    /// from scratch by reloading lists. Statistics reset as well.
    pub fn clear_filter_lists(&self) {
        let mut store = self.write_store();
        store.filters.clear();
        store.index = None;
        drop(store);

        self.invalidate_cache();
        self.reset_statistics();
    }

    // =========================================================================
    // Request Filtering
    // =========================================================================

    /// Block decision for one outgoing request. Fails open: an URL the
    /// engine cannot parse is never blocked.
    pub fn should_block_request(
        &self,
        url: &str,
        resource_type: RequestType,
        origin_domain: &str,
    ) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let request = match RequestInfo::parse(url, resource_type, origin_domain) {
            Some(request) => request,
            None => return false,
        };

        // The decision depends on type and origin as well as the URL, so all
        // three go into the cache key; a bare-URL key would alias distinct
        // requests to one cached answer.
        let cache_key = format!("{:x}|{}|{}", resource_type.bits(), request.origin, request.url);
        if let Some(cached) = self.lock_cache().check_url(&cache_key) {
            return cached;
        }

        let generation = self.store_generation.load(Ordering::Acquire);
        let blocked = self.with_matcher(|matcher| matcher.should_block(&request));

        // A mutation may have cleared the cache while we computed; a result
        // from the old snapshot must not outlive that clear.
        let mut cache = self.lock_cache();
        if self.store_generation.load(Ordering::Acquire) == generation {
            cache.insert_url(&cache_key, blocked);
        }
        blocked
    }

    /// Local resource substituted for a matching request, if any rule names
    /// one. Independent of the block decision; callers decide the coupling.
    pub fn get_redirect_resource(
        &self,
        url: &str,
        resource_type: RequestType,
        origin_domain: &str,
    ) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }

        let request = RequestInfo::parse(url, resource_type, origin_domain)?;
        self.with_matcher(|matcher| matcher.redirect_resource(&request))
    }

    /// Query parameter names to strip before the request is issued.
    pub fn get_remove_params(
        &self,
        url: &str,
        resource_type: RequestType,
        origin_domain: &str,
    ) -> Vec<String> {
        if !self.is_enabled() {
            return Vec::new();
        }

        let request = match RequestInfo::parse(url, resource_type, origin_domain) {
            Some(request) => request,
            None => return Vec::new(),
        };
        self.with_matcher(|matcher| matcher.remove_params(&request))
    }

    /// Convenience used by the resource loader's plain URL filter.
    pub fn is_filtered(&self, url: &str) -> bool {
        self.should_block_request(url, RequestType::OTHER, "")
    }

    // =========================================================================
    // Cosmetic Filtering
    // =========================================================================

    /// CSS selectors to hide on `domain`. The domain cache only memoizes
    /// "has no selectors"; a positive entry still recomputes the list.
    pub fn get_cosmetic_filters_for_domain(&self, domain: &str) -> Vec<String> {
        if !self.is_enabled() {
            return Vec::new();
        }

        let domain = domain.trim().to_ascii_lowercase();
        if let Some(false) = self.lock_cache().check_domain(&domain) {
            return Vec::new();
        }

        let generation = self.store_generation.load(Ordering::Acquire);
        let selectors = self.with_matcher(|matcher| matcher.cosmetic_selectors(&domain));

        let mut cache = self.lock_cache();
        if self.store_generation.load(Ordering::Acquire) == generation {
            cache.insert_domain(&domain, !selectors.is_empty());
        }
        selectors
    }

    /// Scriptlet snippets for `domain` (best-effort containment match).
    pub fn get_script_filters_for_domain(&self, domain: &str) -> Vec<String> {
        if !self.is_enabled() {
            return Vec::new();
        }

        let domain = domain.trim().to_ascii_lowercase();
        self.with_matcher(|matcher| matcher.scriptlets_for_domain(&domain))
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Counters are caller-reported: the request and style pipelines call
    /// the increment methods when they act on a positive result.
    pub fn increment_blocked_request_count(&self) {
        self.blocked_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_blocked_element_count(&self) {
        self.blocked_elements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn blocked_requests_count(&self) -> u64 {
        self.blocked_requests.load(Ordering::Relaxed)
    }

    pub fn blocked_elements_count(&self) -> u64 {
        self.blocked_elements.load(Ordering::Relaxed)
    }

    pub fn reset_statistics(&self) {
        self.blocked_requests.store(0, Ordering::Relaxed);
        self.blocked_elements.store(0, Ordering::Relaxed);
    }

    /// Number of compiled network rules currently loaded.
    pub fn network_filter_count(&self) -> usize {
        self.read_store().filters.network.len()
    }

    /// Number of compiled cosmetic rules currently loaded.
    pub fn cosmetic_filter_count(&self) -> usize {
        self.read_store().filters.cosmetic.len()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Run a query against a consistent rule/index snapshot, rebuilding the
    /// index under the write lock if a mutation left it dirty.
    fn with_matcher<R>(&self, query: impl FnOnce(Matcher<'_>) -> R) -> R {
        {
            let store = self.read_store();
            if let Some(index) = &store.index {
                return query(Matcher::new(&store.filters, index));
            }
        }

        let mut store = self.write_store();
        let RuleStore { filters, index } = &mut *store;
        let index = index.get_or_insert_with(|| DomainIndex::build(filters));
        query(Matcher::new(filters, index))
    }

    /// Advance the store generation, then drop every cached decision. The
    /// bump happens first so an in-flight query that started before the
    /// mutation fails its generation check and skips its insert.
    fn invalidate_cache(&self) {
        self.store_generation.fetch_add(1, Ordering::AcqRel);
        self.lock_cache().clear();
    }

    // Lock poisoning is recovered rather than propagated: queries are pure,
    // and a writer can only die between complete states (the index is
    // invalidated by a single `None` store).
    fn read_store(&self) -> RwLockReadGuard<'_, RuleStore> {
        self.store.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_store(&self) -> RwLockWriteGuard<'_, RuleStore> {
        self.store.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_cache(&self) -> MutexGuard<'_, DecisionCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lists_load_cleanly() {
        let engine = FilterEngine::new();
        let stats = engine.load_default_filter_lists().expect("default list is UTF-8");
        assert_eq!(stats.errors, 0);
        assert!(stats.parsed > 0);
    }

    #[test]
    fn invalid_utf8_is_a_load_error() {
        let engine = FilterEngine::new();
        let err = engine.load_filter_list("bad", b"||ads.com^\n\xff\xfe").unwrap_err();
        assert!(matches!(err, EngineError::InvalidEncoding { .. }));
    }

    #[test]
    fn unparseable_url_fails_open() {
        let engine = FilterEngine::new();
        engine.load_filter_list("l", b"ads\n").unwrap();
        assert!(!engine.should_block_request("not a url", RequestType::SCRIPT, ""));
        assert!(!engine.should_block_request("", RequestType::SCRIPT, ""));
    }

    #[test]
    fn statistics_are_caller_reported() {
        let engine = FilterEngine::new();
        engine.increment_blocked_request_count();
        engine.increment_blocked_request_count();
        engine.increment_blocked_element_count();
        assert_eq!(engine.blocked_requests_count(), 2);
        assert_eq!(engine.blocked_elements_count(), 1);
        engine.reset_statistics();
        assert_eq!(engine.blocked_requests_count(), 0);
        assert_eq!(engine.blocked_elements_count(), 0);
    }
}
