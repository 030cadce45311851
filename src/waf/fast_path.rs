//! Single-regex pre-filter.
//!
//! Most traffic is benign, so every string first meets one alternation of all
//! signatures. Only a hit pays for the categorized pass that names the
//! signature. The alternation is built from the very same sources, so a miss
//! here implies a miss on every individual signature.

use regex::Regex;
use std::sync::LazyLock;

use crate::waf::signatures;

static ANY_THREAT: LazyLock<Regex> = LazyLock::new(|| {
    let source = signatures::all()
        .map(|sig| format!("(?:{})", sig.source()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&source).expect("combined signature regex must compile")
});

/// Returns false when `text` is certainly clean.
pub fn is_suspicious(text: &str) -> bool {
    ANY_THREAT.is_match(text)
}

/// Source of the combined regex.
pub fn source() -> &'static str {
    ANY_THREAT.as_str()
}
