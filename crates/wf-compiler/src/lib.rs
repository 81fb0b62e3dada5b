//! WebFilter List Compiler
//!
//! This crate turns Adblock-Plus-style filter-list text into the compiled
//! rule model of `wf-core`. A malformed line never fails a whole load; it
//! is skipped and counted.

pub mod parser;

pub use parser::{parse_filter_list, ListStats, ParseError};
