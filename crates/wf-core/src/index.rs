//! Domain-keyed fast-path index over a [`FilterSet`].
//!
//! Rebuilt from scratch after any rule mutation; never patched
//! incrementally. A stale index is a correctness bug (a newly loaded
//! exception rule must be visible on the next query), so the facade stores
//! the index as an `Option` and drops it whenever the set changes.

use std::collections::HashMap;

use crate::types::{AnchorKind, FilterSet};

/// Partition of network-filter indices: one bucket per cached `||` domain
/// literal, plus a residual list for everything else.
#[derive(Debug, Default)]
pub struct DomainIndex {
    buckets: HashMap<String, Vec<usize>>,
    generic: Vec<usize>,
}

impl DomainIndex {
    /// Build the index in one O(n) pass over the network filters.
    pub fn build(set: &FilterSet) -> Self {
        let mut index = Self::default();

        for (i, filter) in set.network.iter().enumerate() {
            match (&filter.anchor, &filter.domain_key) {
                (AnchorKind::Domain, Some(key)) => {
                    index.buckets.entry(key.clone()).or_default().push(i);
                }
                _ => index.generic.push(i),
            }
        }

        log::debug!(
            "domain index built: {} domain buckets, {} generic filters",
            index.buckets.len(),
            index.generic.len()
        );

        index
    }

    /// Filter indices whose domain literal is exactly `domain`.
    #[inline]
    pub fn bucket(&self, domain: &str) -> Option<&[usize]> {
        self.buckets.get(domain).map(Vec::as_slice)
    }

    /// Filter indices with no usable domain literal.
    #[inline]
    pub fn generic(&self) -> &[usize] {
        &self.generic
    }

    pub fn domain_bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
