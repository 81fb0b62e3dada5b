//! Bounded memoization of prior filtering decisions.
//!
//! Two maps: normalized URL → blocked?, and domain → has-cosmetic-rules?.
//! Eviction is a whole-map clear once a map exceeds its capacity, which
//! bounds worst-case latency at the cost of an occasional cold burst. The
//! owner must call [`DecisionCache::clear`] on every rule mutation and on
//! every enable/disable toggle.

use std::collections::HashMap;

/// Default per-map entry limit.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

#[derive(Debug)]
pub struct DecisionCache {
    url_results: HashMap<String, bool>,
    domain_results: HashMap<String, bool>,
    capacity: usize,
}

impl DecisionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            url_results: HashMap::new(),
            domain_results: HashMap::new(),
            capacity,
        }
    }

    /// Cached block decision for a normalized URL.
    pub fn check_url(&self, url: &str) -> Option<bool> {
        self.url_results.get(url).copied()
    }

    pub fn insert_url(&mut self, url: &str, blocked: bool) {
        if self.url_results.len() >= self.capacity {
            self.url_results.clear();
        }
        self.url_results.insert(url.to_string(), blocked);
    }

    /// Cached "domain has any cosmetic rules" bit.
    pub fn check_domain(&self, domain: &str) -> Option<bool> {
        self.domain_results.get(domain).copied()
    }

    pub fn insert_domain(&mut self, domain: &str, has_filters: bool) {
        if self.domain_results.len() >= self.capacity {
            self.domain_results.clear();
        }
        self.domain_results.insert(domain.to_string(), has_filters);
    }

    pub fn clear(&mut self) {
        self.url_results.clear();
        self.domain_results.clear();
    }

    pub fn len(&self) -> usize {
        self.url_results.len() + self.domain_results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.url_results.is_empty() && self.domain_results.is_empty()
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
