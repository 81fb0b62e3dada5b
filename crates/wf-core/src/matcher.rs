//! Per-request and per-domain rule evaluation.
//!
//! This is the hot path: every network request and every element style pass
//! ends up here on a cache miss. The matcher only ever walks the relevant
//! index buckets (the request host's suffix buckets, then the generic
//! bucket), never the full rule set when avoidable.
//!
//! Decision policy: a request is blocked iff at least one non-exception
//! filter matches and no exception filter matches. Exceptions always win,
//! regardless of the order rules were loaded in.

use crate::index::DomainIndex;
use crate::types::{AnchorKind, CosmeticFilter, FilterSet, NetworkFilter, PartyMask, RequestType};
use crate::url::{extract_host, host_matches_suffix, host_suffixes, is_third_party};

// =============================================================================
// Request Info
// =============================================================================

/// Everything about one request the matcher needs, derived once per query.
#[derive(Debug)]
pub struct RequestInfo<'a> {
    /// Trimmed original URL.
    pub url: &'a str,
    /// Lowercased copy for case-insensitive comparisons.
    pub url_lower: String,
    /// Lowercased request host.
    pub host: String,
    pub resource_type: RequestType,
    /// Lowercased initiating-origin domain; empty when unknown.
    pub origin: String,
    pub is_third_party: bool,
}

impl<'a> RequestInfo<'a> {
    /// Derive request facts from the raw query inputs.
    ///
    /// Returns `None` when no host can be extracted; callers treat that as
    /// "no match" rather than an error (a filtering engine fails open for
    /// unrecognized input).
    pub fn parse(url: &'a str, resource_type: RequestType, origin_domain: &str) -> Option<Self> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }

        let host = extract_host(url)?.to_ascii_lowercase();
        let origin = origin_domain.trim().to_ascii_lowercase();
        let third_party = !origin.is_empty() && is_third_party(&host, &origin);

        Some(Self {
            url,
            url_lower: url.to_ascii_lowercase(),
            host,
            resource_type,
            origin,
            is_third_party: third_party,
        })
    }
}

// =============================================================================
// Matcher
// =============================================================================

/// Evaluates queries against one consistent `FilterSet` + `DomainIndex`
/// snapshot. The facade guarantees the pair never changes underneath it.
pub struct Matcher<'a> {
    set: &'a FilterSet,
    index: &'a DomainIndex,
}

impl<'a> Matcher<'a> {
    pub fn new(set: &'a FilterSet, index: &'a DomainIndex) -> Self {
        Self { set, index }
    }

    /// Block decision for one request. Exceptions always win.
    pub fn should_block(&self, req: &RequestInfo<'_>) -> bool {
        let exception = self
            .scan_candidates(req, |f| (f.is_exception && filter_matches(f, req)).then_some(()));
        if exception.is_some() {
            return false;
        }

        let blocked = self
            .scan_candidates(req, |f| (!f.is_exception && filter_matches(f, req)).then_some(()));
        if blocked.is_some() {
            return true;
        }

        // Legacy substring patterns (block-only, stored lowercased).
        self.set
            .patterns
            .iter()
            .any(|p| req.url_lower.contains(p.as_str()))
    }

    /// First matching `redirect=` payload among non-exception filters.
    ///
    /// Independent of the block decision: callers are expected to consult it
    /// only when they would otherwise block, but the engine does not enforce
    /// that coupling.
    pub fn redirect_resource(&self, req: &RequestInfo<'_>) -> Option<String> {
        self.scan_candidates(req, |f| {
            if f.is_exception || f.redirect_resource.is_none() {
                return None;
            }
            if !filter_matches(f, req) {
                return None;
            }
            f.redirect_resource.clone()
        })
    }

    /// Ordered, deduplicated union of `removeparam=` payloads across every
    /// matching non-exception filter.
    pub fn remove_params(&self, req: &RequestInfo<'_>) -> Vec<String> {
        let mut params: Vec<String> = Vec::new();

        let _: Option<()> = self.scan_candidates(req, |f| {
            if !f.is_exception && !f.remove_params.is_empty() && filter_matches(f, req) {
                for param in &f.remove_params {
                    if !params.contains(param) {
                        params.push(param.clone());
                    }
                }
            }
            None
        });

        params
    }

    /// CSS selectors to hide on `domain` (lowercased by the caller).
    ///
    /// Exception-flagged cosmetic filters are skipped, not reconciled: a
    /// caller that wants `#@#` semantics filters the returned selectors by
    /// string equality itself.
    pub fn cosmetic_selectors(&self, domain: &str) -> Vec<String> {
        self.set
            .cosmetic
            .iter()
            .filter(|f| !f.is_exception && cosmetic_applies(f, domain))
            .map(|f| f.selector.clone())
            .collect()
    }

    /// Scriptlet snippets for `domain`. Best-effort containment match, as in
    /// the scriptlet map's loose keying.
    pub fn scriptlets_for_domain(&self, domain: &str) -> Vec<String> {
        self.set
            .scriptlets
            .iter()
            .filter(|(key, _)| domain.contains(key.as_str()) || key.contains(domain))
            .map(|(_, snippet)| snippet.clone())
            .collect()
    }

    /// Visit candidate network filters in decision order: the bucket of each
    /// host suffix (most specific first), then the generic bucket.
    /// Short-circuits when `visit` produces a value.
    fn scan_candidates<R>(
        &self,
        req: &RequestInfo<'_>,
        mut visit: impl FnMut(&NetworkFilter) -> Option<R>,
    ) -> Option<R> {
        for suffix in host_suffixes(&req.host) {
            if let Some(bucket) = self.index.bucket(suffix) {
                for &i in bucket {
                    if let Some(result) = visit(&self.set.network[i]) {
                        return Some(result);
                    }
                }
            }
        }

        for &i in self.index.generic() {
            if let Some(result) = visit(&self.set.network[i]) {
                return Some(result);
            }
        }

        None
    }
}

// =============================================================================
// Network Filter Matching
// =============================================================================

/// Full multi-criteria check of one filter against one request.
pub fn filter_matches(filter: &NetworkFilter, req: &RequestInfo<'_>) -> bool {
    // Regex filters are flagged but inert.
    if filter.is_regex {
        return false;
    }

    // Resource type: empty mask matches every type.
    if !filter.type_mask.is_empty() && !filter.type_mask.intersects(req.resource_type) {
        return false;
    }

    if filter.party_mask.contains(PartyMask::THIRD_PARTY) && !req.is_third_party {
        return false;
    }
    if filter.party_mask.contains(PartyMask::FIRST_PARTY) && req.is_third_party {
        return false;
    }

    if !matches_domain_scope(filter, req) {
        return false;
    }

    matches_url(filter, req)
}

/// `domain=` scoping: excludes reject, includes (when present) must hit.
/// Both the initiator and the target host are considered, as suffixes.
fn matches_domain_scope(filter: &NetworkFilter, req: &RequestInfo<'_>) -> bool {
    for excluded in &filter.domains_exclude {
        if host_matches_suffix(&req.origin, excluded) || host_matches_suffix(&req.host, excluded) {
            return false;
        }
    }

    if !filter.domains_include.is_empty() {
        return filter
            .domains_include
            .iter()
            .any(|inc| host_matches_suffix(&req.origin, inc) || host_matches_suffix(&req.host, inc));
    }

    true
}

/// URL pattern check, dispatched on the anchor cached at parse time.
fn matches_url(filter: &NetworkFilter, req: &RequestInfo<'_>) -> bool {
    if filter.anchor == AnchorKind::Domain {
        // Hosts are case-insensitive; domain-anchored patterns are stored
        // lowercased and compared against the lowercased URL.
        return match_domain_anchor(filter, &req.url_lower);
    }

    let haystack = if filter.case_sensitive {
        req.url
    } else {
        req.url_lower.as_str()
    };
    let pattern = filter.pattern.as_str();

    match filter.anchor {
        AnchorKind::Exact => haystack == pattern,
        AnchorKind::Start => haystack.starts_with(pattern),
        AnchorKind::End => haystack.ends_with(pattern),
        _ => {
            if pattern.contains('*') {
                wildcard_match(haystack, pattern)
            } else {
                haystack.contains(pattern)
            }
        }
    }
}

/// `||` matching: the cached domain literal must occur at a domain boundary
/// (`/` or `.` or start-of-string before it; `/`, `:`, `?`, `#` or
/// end-of-URL after it), and the rest of the pattern (any path part) must
/// follow as a prefix. Every occurrence of the literal is tried, so a path
/// mention of the domain cannot mask a real host match.
fn match_domain_anchor(filter: &NetworkFilter, url: &str) -> bool {
    let key = match &filter.domain_key {
        Some(key) => key.as_str(),
        // No usable host literal (e.g. `||*/ads/*`): the anchor cannot be
        // pinned to a host, so match the whole pattern over the URL.
        None => {
            return if filter.pattern.contains('*') {
                wildcard_match(url, &filter.pattern)
            } else {
                url.contains(filter.pattern.as_str())
            };
        }
    };

    let bytes = url.as_bytes();
    let mut search = 0;

    while let Some(found) = url[search..].find(key) {
        let pos = search + found;
        let boundary_before = pos == 0 || matches!(bytes[pos - 1], b'/' | b'.');

        if boundary_before {
            let key_end = pos + key.len();
            let boundary_after =
                key_end == url.len() || matches!(bytes[key_end], b'/' | b':' | b'?' | b'#');

            if boundary_after && pattern_matches_at(&url[pos..], &filter.pattern) {
                return true;
            }
        }

        search = pos + 1;
    }

    false
}

/// Prefix match of a domain-anchored pattern (domain literal plus any path
/// part) at the start of `rest`, honoring `*` wildcards in the path.
fn pattern_matches_at(rest: &str, pattern: &str) -> bool {
    if !pattern.contains('*') {
        return rest.starts_with(pattern);
    }

    let mut pos = 0;
    let mut anchored = true;
    for part in pattern.split('*') {
        if part.is_empty() {
            anchored = false;
            continue;
        }
        if anchored {
            if !rest.starts_with(part) {
                return false;
            }
            pos = part.len();
            anchored = false;
        } else {
            match rest[pos..].find(part) {
                Some(i) => pos += i + part.len(),
                None => return false,
            }
        }
    }
    true
}

/// Glob matching without backtracking across segments: each non-empty
/// segment must appear in order, scanning greedily left to right.
fn wildcard_match(haystack: &str, pattern: &str) -> bool {
    let mut pos = 0;
    for part in pattern.split('*') {
        if part.is_empty() {
            continue;
        }
        match haystack[pos..].find(part) {
            Some(i) => pos += i + part.len(),
            None => return false,
        }
    }
    true
}

// =============================================================================
// Cosmetic Filter Matching
// =============================================================================

/// Whether a cosmetic filter applies on `domain`: not excluded, and either
/// generic or explicitly included.
pub fn cosmetic_applies(filter: &CosmeticFilter, domain: &str) -> bool {
    for excluded in &filter.domains_exclude {
        if host_matches_suffix(domain, excluded) {
            return false;
        }
    }

    if !filter.domains_include.is_empty() {
        return filter
            .domains_include
            .iter()
            .any(|inc| host_matches_suffix(domain, inc));
    }

    filter.is_generic
}
