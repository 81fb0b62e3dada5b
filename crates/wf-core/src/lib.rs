//! WebFilter Core Library
//!
//! This crate provides the rule model and matching engine for the WebFilter
//! content blocker. It holds no locks and performs no I/O: filter-list text
//! is compiled elsewhere (`wf-compiler`) and shared-state discipline lives
//! in the facade crate (`wf-engine`).
//!
//! # Architecture
//!
//! Compiled rules live in a [`FilterSet`]. Before the first query after any
//! mutation, a [`DomainIndex`] is rebuilt so that `||domain`-anchored rules
//! are found by host lookup instead of a linear scan. The [`Matcher`] walks
//! the relevant index buckets only, with exception rules overriding blocking
//! rules regardless of load order.
//!
//! # Modules
//!
//! - `types`: rule model shared across the workspace
//! - `url`: scheme/host extraction and domain-suffix helpers
//! - `index`: domain-keyed fast-path index over a `FilterSet`
//! - `matcher`: per-request and per-domain rule evaluation
//! - `cache`: bounded memoization of prior decisions

pub mod cache;
pub mod index;
pub mod matcher;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use cache::DecisionCache;
pub use index::DomainIndex;
pub use matcher::{Matcher, RequestInfo};
pub use types::{AnchorKind, CosmeticFilter, FilterSet, NetworkFilter, PartyMask, RequestType};
