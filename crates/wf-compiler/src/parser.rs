//! Filter-list text → compiled rules.
//!
//! One trimmed, non-empty, non-comment line becomes one rule. Lines that
//! cannot be classified are skipped and counted; the load itself never
//! aborts on bad syntax.

use thiserror::Error;

use wf_core::types::{AnchorKind, CosmeticFilter, FilterSet, NetworkFilter, PartyMask, RequestType};

// =============================================================================
// Errors & Statistics
// =============================================================================

/// Why a single filter line was rejected. Recovered locally: the line is
/// counted and skipped, the rest of the list still loads.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty filter pattern")]
    EmptyPattern,
    #[error("empty cosmetic selector")]
    EmptySelector,
    #[error("unknown filter option `{0}`")]
    UnknownOption(String),
    #[error("option `{0}` requires a value")]
    EmptyOptionValue(&'static str),
    #[error("malformed scriptlet filter")]
    MalformedScriptlet,
}

/// Per-list parse counts, reported for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListStats {
    pub parsed: usize,
    pub errors: usize,
}

// =============================================================================
// List Parsing
// =============================================================================

/// Parse one filter list into `set`. Blank lines and `!` comments are
/// ignored; unparseable lines are counted in [`ListStats::errors`].
pub fn parse_filter_list(content: &str, set: &mut FilterSet) -> ListStats {
    let mut stats = ListStats::default();

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('!') {
            continue;
        }

        match parse_line(line) {
            Ok(ParsedLine::Network(filter)) => {
                set.network.push(filter);
                stats.parsed += 1;
            }
            Ok(ParsedLine::Cosmetic(filter)) => {
                set.cosmetic.push(filter);
                stats.parsed += 1;
            }
            Ok(ParsedLine::Scriptlet { domain, snippet }) => {
                set.scriptlets.insert(domain, snippet);
                stats.parsed += 1;
            }
            Err(err) => {
                log::debug!("skipping filter line `{line}`: {err}");
                stats.errors += 1;
            }
        }
    }

    stats
}

#[derive(Debug)]
enum ParsedLine {
    Network(NetworkFilter),
    Cosmetic(CosmeticFilter),
    Scriptlet { domain: String, snippet: String },
}

fn parse_line(line: &str) -> Result<ParsedLine, ParseError> {
    // Scriptlets first: `a.com##+js(...)` also contains the cosmetic
    // separator and must not be misread as a selector rule. Only the
    // separator-prefixed spellings (`#+js(`, `#@+js(`) count; a `+js(`
    // inside a network pattern stays a network pattern.
    if let Some(js_pos) = line.find("+js(") {
        let prefix = &line[..js_pos];
        if prefix.ends_with('#') || prefix.ends_with("#@") {
            return parse_scriptlet(line, js_pos);
        }
    }

    if let Some((pos, separator, is_exception)) = find_cosmetic_separator(line) {
        return parse_cosmetic_filter(line, pos, separator, is_exception).map(ParsedLine::Cosmetic);
    }

    parse_network_filter(line).map(ParsedLine::Network)
}

// =============================================================================
// Scriptlet Filters
// =============================================================================

/// Scriptlet lines are stored as (domain part → snippet) pairs, best-effort.
/// They are matched by domain containment only, never by resource type.
/// `js_pos` points at `+js(`, just past a `#` or `#@` separator.
fn parse_scriptlet(line: &str, js_pos: usize) -> Result<ParsedLine, ParseError> {
    let domain = line[..js_pos].trim_end_matches(['#', '@']).trim();
    let snippet = &line[js_pos..];

    if domain.is_empty() || !snippet.ends_with(')') {
        return Err(ParseError::MalformedScriptlet);
    }

    Ok(ParsedLine::Scriptlet {
        domain: domain.to_ascii_lowercase(),
        snippet: snippet.to_string(),
    })
}

// =============================================================================
// Cosmetic Filters
// =============================================================================

/// Locate the first cosmetic separator. `#?#` (procedural) is treated
/// identically to `##` for matching purposes.
fn find_cosmetic_separator(line: &str) -> Option<(usize, &'static str, bool)> {
    let mut best: Option<(usize, &'static str, bool)> = None;

    for (separator, is_exception) in [("#@#", true), ("#?#", false), ("##", false)] {
        if let Some(pos) = line.find(separator) {
            let better = match best {
                Some((best_pos, _, _)) => pos < best_pos,
                None => true,
            };
            if better {
                best = Some((pos, separator, is_exception));
            }
        }
    }

    best
}

fn parse_cosmetic_filter(
    line: &str,
    separator_pos: usize,
    separator: &str,
    is_exception: bool,
) -> Result<CosmeticFilter, ParseError> {
    let domains_part = line[..separator_pos].trim();
    let selector = line[separator_pos + separator.len()..].trim();

    if selector.is_empty() {
        return Err(ParseError::EmptySelector);
    }

    let mut filter = CosmeticFilter {
        selector: selector.to_string(),
        is_exception,
        ..CosmeticFilter::default()
    };

    for entry in domains_part.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match entry.strip_prefix('~') {
            Some(excluded) => filter.domains_exclude.push(excluded.to_ascii_lowercase()),
            None => filter.domains_include.push(entry.to_ascii_lowercase()),
        }
    }

    filter.is_generic = filter.domains_include.is_empty();
    Ok(filter)
}

// =============================================================================
// Network Filters
// =============================================================================

fn parse_network_filter(line: &str) -> Result<NetworkFilter, ParseError> {
    let mut filter = NetworkFilter::default();
    let mut rest = line;

    if let Some(stripped) = rest.strip_prefix("@@") {
        filter.is_exception = true;
        rest = stripped.trim_start();
    }

    // Split on the first `$` only; a `$` inside the options value list
    // belongs to the options.
    let (pattern_part, options_part) = match rest.find('$') {
        Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
        None => (rest, None),
    };

    if let Some(options) = options_part {
        parse_options(options, &mut filter)?;
    }

    let pattern = pattern_part.trim();

    // `/…/`-delimited regex filter: flagged for forward compatibility,
    // currently never matches.
    if pattern.len() >= 2 && pattern.starts_with('/') && pattern.ends_with('/') {
        filter.is_regex = true;
        filter.pattern = pattern[1..pattern.len() - 1].to_string();
        return Ok(filter);
    }

    if let Some(body) = pattern.strip_prefix("||") {
        let body = body.strip_suffix('^').unwrap_or(body);
        if body.is_empty() {
            return Err(ParseError::EmptyPattern);
        }
        filter.anchor = AnchorKind::Domain;
        // Hosts are case-insensitive; domain-anchored patterns are always
        // stored lowercased.
        filter.pattern = body.to_ascii_lowercase();
        filter.domain_key = domain_key_of(&filter.pattern);
        return Ok(filter);
    }

    let (anchor, body) = if pattern.len() >= 2 && pattern.starts_with('|') && pattern.ends_with('|')
    {
        (AnchorKind::Exact, &pattern[1..pattern.len() - 1])
    } else if let Some(body) = pattern.strip_prefix('|') {
        (AnchorKind::Start, body)
    } else if let Some(body) = pattern.strip_suffix('|') {
        (AnchorKind::End, body)
    } else {
        (AnchorKind::None, pattern)
    };

    if body.is_empty() && !matches!(anchor, AnchorKind::None) {
        return Err(ParseError::EmptyPattern);
    }
    // An empty un-anchored pattern is only meaningful when options carry the
    // rule (e.g. `$removeparam=x` applies to every URL).
    if body.is_empty() && options_part.is_none() {
        return Err(ParseError::EmptyPattern);
    }

    filter.anchor = anchor;
    filter.pattern = if filter.case_sensitive {
        body.to_string()
    } else {
        body.to_ascii_lowercase()
    };

    Ok(filter)
}

/// Cached `||` domain literal: the host portion of the pattern, up to the
/// first `/`. Anything other than a plain hostname (wildcards, separators)
/// disqualifies the rule from the domain index.
fn domain_key_of(pattern: &str) -> Option<String> {
    let host_part = pattern.split('/').next().unwrap_or("");
    if host_part.is_empty() {
        return None;
    }
    if !host_part
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return None;
    }
    Some(host_part.to_string())
}

// =============================================================================
// Options
// =============================================================================

/// Options the original recognizes but that have no effect on matching.
const INERT_OPTIONS: &[&str] = &[
    "important",
    "popup",
    "generichide",
    "genericblock",
    "elemhide",
    "inline-script",
    "inline-font",
    "badfilter",
];

fn parse_options(options: &str, filter: &mut NetworkFilter) -> Result<(), ParseError> {
    for raw in options.split(',') {
        let option = raw.trim();
        if option.is_empty() {
            continue;
        }

        if let Some(value) = option.strip_prefix("domain=") {
            for entry in value.split('|') {
                let entry = entry.trim();
                if entry.is_empty() {
                    continue;
                }
                match entry.strip_prefix('~') {
                    Some(excluded) => filter.domains_exclude.push(excluded.to_ascii_lowercase()),
                    None => filter.domains_include.push(entry.to_ascii_lowercase()),
                }
            }
            continue;
        }

        if let Some(value) = option.strip_prefix("redirect=") {
            if value.is_empty() {
                return Err(ParseError::EmptyOptionValue("redirect"));
            }
            filter.redirect_resource = Some(value.to_string());
            continue;
        }

        if let Some(value) = option.strip_prefix("removeparam=") {
            if value.is_empty() {
                return Err(ParseError::EmptyOptionValue("removeparam"));
            }
            for param in value.split('|') {
                let param = param.trim();
                if !param.is_empty() && !filter.remove_params.iter().any(|p| p == param) {
                    filter.remove_params.push(param.to_string());
                }
            }
            continue;
        }

        let keyword = option.to_ascii_lowercase();
        match keyword.as_str() {
            "third-party" | "3p" => filter.party_mask |= PartyMask::THIRD_PARTY,
            "first-party" | "1p" => filter.party_mask |= PartyMask::FIRST_PARTY,
            "match-case" => filter.case_sensitive = true,
            _ => {
                if let Some(mask) = request_type_option(&keyword) {
                    filter.type_mask |= mask;
                } else if !INERT_OPTIONS.contains(&keyword.as_str()) {
                    return Err(ParseError::UnknownOption(option.to_string()));
                }
            }
        }
    }

    Ok(())
}

fn request_type_option(name: &str) -> Option<RequestType> {
    let mask = match name {
        "script" => RequestType::SCRIPT,
        "image" => RequestType::IMAGE,
        "stylesheet" => RequestType::STYLESHEET,
        "document" => RequestType::DOCUMENT,
        "subdocument" => RequestType::SUBDOCUMENT,
        "object" => RequestType::OBJECT,
        "xmlhttprequest" | "xhr" => RequestType::XHR,
        "font" => RequestType::FONT,
        "media" => RequestType::MEDIA,
        "websocket" => RequestType::WEBSOCKET,
        "ping" => RequestType::PING,
        "csp" => RequestType::CSP,
        "other" => RequestType::OTHER,
        _ => return None,
    };
    Some(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(line: &str) -> NetworkFilter {
        match parse_line(line).expect("line must parse") {
            ParsedLine::Network(filter) => filter,
            other => panic!("expected network filter, got {other:?}"),
        }
    }

    fn parse_one_cosmetic(line: &str) -> CosmeticFilter {
        match parse_line(line).expect("line must parse") {
            ParsedLine::Cosmetic(filter) => filter,
            other => panic!("expected cosmetic filter, got {other:?}"),
        }
    }

    #[test]
    fn comments_and_blanks_are_skipped_silently() {
        let mut set = FilterSet::new();
        let stats = parse_filter_list("! comment\n\n   \n||ads.com^\n", &mut set);
        assert_eq!(stats, ListStats { parsed: 1, errors: 0 });
        assert_eq!(set.network.len(), 1);
    }

    #[test]
    fn domain_anchor_caches_literal_without_path() {
        let filter = parse_one("||doubleclick.net/gampad/^");
        assert_eq!(filter.anchor, AnchorKind::Domain);
        assert_eq!(filter.pattern, "doubleclick.net/gampad/");
        assert_eq!(filter.domain_key.as_deref(), Some("doubleclick.net"));
    }

    #[test]
    fn domain_anchor_with_wildcard_host_has_no_key() {
        let filter = parse_one("||*/ads/*");
        assert_eq!(filter.anchor, AnchorKind::Domain);
        assert_eq!(filter.domain_key, None);
    }

    #[test]
    fn anchor_kinds() {
        assert_eq!(parse_one("|https://x.com/a|").anchor, AnchorKind::Exact);
        assert_eq!(parse_one("|https://x.com/").anchor, AnchorKind::Start);
        assert_eq!(parse_one(".swf|").anchor, AnchorKind::End);
        assert_eq!(parse_one("/banner/img").anchor, AnchorKind::None);
    }

    #[test]
    fn exception_prefix() {
        let filter = parse_one("@@||example.com/allow^$domain=example.com");
        assert!(filter.is_exception);
        assert_eq!(filter.domain_key.as_deref(), Some("example.com"));
        assert_eq!(filter.domains_include, vec!["example.com"]);
    }

    #[test]
    fn options_populate_masks_and_payloads() {
        let filter = parse_one("||ads.com^$script,image,third-party,domain=a.com|~b.a.com,redirect=noop.js,removeparam=utm_source|fbclid");
        assert_eq!(filter.type_mask, RequestType::SCRIPT | RequestType::IMAGE);
        assert_eq!(filter.party_mask, PartyMask::THIRD_PARTY);
        assert_eq!(filter.domains_include, vec!["a.com"]);
        assert_eq!(filter.domains_exclude, vec!["b.a.com"]);
        assert_eq!(filter.redirect_resource.as_deref(), Some("noop.js"));
        assert_eq!(filter.remove_params, vec!["utm_source", "fbclid"]);
    }

    #[test]
    fn match_case_keeps_pattern_case() {
        let filter = parse_one("/BannerAd$match-case");
        assert!(filter.case_sensitive);
        assert_eq!(filter.pattern, "/BannerAd");

        let folded = parse_one("/BannerAd");
        assert_eq!(folded.pattern, "/bannerad");
    }

    #[test]
    fn inert_options_are_accepted() {
        let filter = parse_one("||ads.com^$important,popup,badfilter");
        assert!(filter.type_mask.is_empty());
    }

    #[test]
    fn unknown_option_is_a_parse_error() {
        match parse_line("||ads.com^$frobnicate") {
            Err(ParseError::UnknownOption(option)) => assert_eq!(option, "frobnicate"),
            other => panic!("expected unknown-option error, got {other:?}"),
        }
    }

    #[test]
    fn regex_filters_are_flagged() {
        let filter = parse_one("/ads[0-9]+/");
        assert!(filter.is_regex);
        assert_eq!(filter.pattern, "ads[0-9]+");
    }

    #[test]
    fn global_option_only_rule_is_allowed() {
        let filter = parse_one("$removeparam=utm_source");
        assert_eq!(filter.anchor, AnchorKind::None);
        assert!(filter.pattern.is_empty());
        assert_eq!(filter.remove_params, vec!["utm_source"]);
    }

    #[test]
    fn bare_anchors_are_errors() {
        assert!(parse_line("||").is_err());
        assert!(parse_line("@@").is_err());
        assert!(parse_line("||^").is_err());
    }

    #[test]
    fn cosmetic_rule_kinds() {
        let generic = parse_one_cosmetic("##.ad-banner");
        assert!(generic.is_generic);
        assert!(!generic.is_exception);
        assert_eq!(generic.selector, ".ad-banner");

        let scoped = parse_one_cosmetic("a.com,~b.a.com##.promo");
        assert!(!scoped.is_generic);
        assert_eq!(scoped.domains_include, vec!["a.com"]);
        assert_eq!(scoped.domains_exclude, vec!["b.a.com"]);

        let exception = parse_one_cosmetic("a.com#@#.promo");
        assert!(exception.is_exception);

        let procedural = parse_one_cosmetic("a.com#?#.item:has(.ad)");
        assert!(!procedural.is_exception);
        assert_eq!(procedural.selector, ".item:has(.ad)");
    }

    #[test]
    fn empty_selector_is_an_error() {
        assert_eq!(parse_line("a.com##").unwrap_err(), ParseError::EmptySelector);
    }

    #[test]
    fn scriptlets_go_to_the_snippet_map() {
        let mut set = FilterSet::new();
        let stats = parse_filter_list("a.com##+js(no-overlay)\nb.com#@+js(abort-on)\n", &mut set);
        assert_eq!(stats.parsed, 2);
        assert_eq!(set.scriptlets.get("a.com").map(String::as_str), Some("+js(no-overlay)"));
        assert!(set.scriptlets.contains_key("b.com"));
    }

    #[test]
    fn plus_js_inside_a_network_pattern_is_not_a_scriptlet() {
        let filter = parse_one("/ads#banner+js(track)");
        assert_eq!(filter.anchor, AnchorKind::None);
        assert_eq!(filter.pattern, "/ads#banner+js(track)");
        assert!(!filter.is_exception);
    }

    #[test]
    fn bad_lines_are_counted_not_fatal() {
        let mut set = FilterSet::new();
        let stats = parse_filter_list("||ads.com^\n||\na.com##\n##.ok\n", &mut set);
        assert_eq!(stats, ListStats { parsed: 2, errors: 2 });
        assert_eq!(set.network.len(), 1);
        assert_eq!(set.cosmetic.len(), 1);
    }
}
