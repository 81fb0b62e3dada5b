//! Rule model shared across the WebFilter workspace.
//!
//! These types are produced by the parser in `wf-compiler` and consumed by
//! the matcher. All fields are fixed at parse time; nothing here is
//! recomputed on the query path.

use std::collections::HashMap;

// =============================================================================
// Resource Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Resource type bit mask.
    ///
    /// A rule whose mask is empty matches every resource type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RequestType: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const DOCUMENT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const OBJECT = 1 << 6;
        const XHR = 1 << 7;
        const FONT = 1 << 8;
        const MEDIA = 1 << 9;
        const WEBSOCKET = 1 << 10;
        const PING = 1 << 11;
        const CSP = 1 << 12;
    }
}

impl RequestType {
    /// Parse from the resource-type tag handed in by the request pipeline.
    pub fn from_label(label: &str) -> Self {
        match label {
            "document" => Self::DOCUMENT,
            "subdocument" => Self::SUBDOCUMENT,
            "stylesheet" => Self::STYLESHEET,
            "script" => Self::SCRIPT,
            "image" => Self::IMAGE,
            "font" => Self::FONT,
            "object" => Self::OBJECT,
            "xmlhttprequest" | "xhr" => Self::XHR,
            "ping" => Self::PING,
            "csp" => Self::CSP,
            "media" => Self::MEDIA,
            "websocket" => Self::WEBSOCKET,
            _ => Self::OTHER,
        }
    }
}

// =============================================================================
// Party Masks
// =============================================================================

bitflags::bitflags! {
    /// Party (first-party / third-party) constraint mask.
    ///
    /// Empty means the rule does not care about the request's party.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PartyMask: u8 {
        const FIRST_PARTY = 1 << 0;
        const THIRD_PARTY = 1 << 1;
    }
}

// =============================================================================
// Anchors
// =============================================================================

/// Pattern anchor, derived once from the raw rule text at parse time.
///
/// The anchor delimiters themselves (`||`, leading/trailing `|`) are
/// stripped from the stored pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorKind {
    /// Substring / wildcard matching.
    #[default]
    None,
    /// `||`: match must begin at a domain boundary.
    Domain,
    /// Leading `|`: prefix match.
    Start,
    /// Trailing `|`: suffix match.
    End,
    /// `|...|`: full-string equality.
    Exact,
}

// =============================================================================
// Network Filters
// =============================================================================

/// One compiled blocking/exception rule for resource requests.
#[derive(Debug, Clone, Default)]
pub struct NetworkFilter {
    /// Match text with anchor delimiters stripped. Pre-lowercased unless
    /// `case_sensitive` is set, so the matcher never lowercases a pattern.
    pub pattern: String,
    pub anchor: AnchorKind,
    /// Cached `||` domain literal (host portion of `pattern`, never a path
    /// segment). `None` for non-domain anchors and for domain anchors whose
    /// host portion is not a plain literal (e.g. contains `*`); those rules
    /// fall to the generic bucket.
    pub domain_key: Option<String>,
    /// `@@` prefix: this rule overrides any blocking rule it matches.
    pub is_exception: bool,
    /// `/…/`-delimited pattern. Kept for forward compatibility; regex rules
    /// currently never match.
    pub is_regex: bool,
    /// `match-case` option. Default comparison is case-insensitive.
    pub case_sensitive: bool,
    /// Resource types this rule applies to; empty = all.
    pub type_mask: RequestType,
    /// First/third-party constraint; empty = don't care.
    pub party_mask: PartyMask,
    /// `domain=` option, include entries (lowercased suffixes).
    pub domains_include: Vec<String>,
    /// `domain=` option, `~`-prefixed entries (lowercased suffixes).
    pub domains_exclude: Vec<String>,
    /// `redirect=` option: local resource substituted for the fetch.
    pub redirect_resource: Option<String>,
    /// `removeparam=` option: query parameter names to strip.
    pub remove_params: Vec<String>,
}

// =============================================================================
// Cosmetic Filters
// =============================================================================

/// One selector-hiding rule (`##`, `#@#`, `#?#`).
#[derive(Debug, Clone, Default)]
pub struct CosmeticFilter {
    /// CSS selector to hide on matching pages.
    pub selector: String,
    pub domains_include: Vec<String>,
    pub domains_exclude: Vec<String>,
    /// `#@#` exception; reconciliation against asserted selectors is the
    /// caller's job (by selector-string equality).
    pub is_exception: bool,
    /// True iff `domains_include` is empty: applies everywhere, subject to
    /// the exclude list.
    pub is_generic: bool,
}

// =============================================================================
// Filter Set
// =============================================================================

/// Owns every compiled rule. Grown by repeated list loads; cleared as a
/// whole (there is no per-rule removal).
#[derive(Debug, Default)]
pub struct FilterSet {
    pub network: Vec<NetworkFilter>,
    pub cosmetic: Vec<CosmeticFilter>,
    /// Scriptlet snippets keyed by their domain part. Best-effort: matched
    /// by domain containment only, never by resource type.
    pub scriptlets: HashMap<String, String>,
    /// Legacy plain substring patterns installed via `set_patterns`.
    /// Block-only, matched case-insensitively against the whole URL.
    pub patterns: Vec<String>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard every rule, scriptlet and legacy pattern.
    pub fn clear(&mut self) {
        self.network.clear();
        self.cosmetic.clear();
        self.scriptlets.clear();
        self.patterns.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.network.is_empty()
            && self.cosmetic.is_empty()
            && self.scriptlets.is_empty()
            && self.patterns.is_empty()
    }
}
