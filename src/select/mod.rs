//! Bulk selection of observations.
//!
//! Two interchangeable strategies feed the lineage walker: a directory
//! scan over light-curve side-car files (existence proofs), and an indexed
//! query over per-telescope report files. Both yield observation
//! identifiers; everything downstream is identical.

pub mod report;
pub mod scan;

use crate::Result;
use anyhow::Context;
use regex::Regex;

/// Compile a glob-style pattern (`*` wildcard only) into an anchored,
/// case-insensitive full-match regex.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("(?i)^{escaped}$")).with_context(|| format!("bad pattern: {pattern}"))
}
