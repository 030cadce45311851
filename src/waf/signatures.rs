//! Threat signature library.
//!
//! Every signature is a category-tagged regex compiled once on first use and
//! shared by all requests. `Regex::is_match` keeps no cursor between calls, so
//! the compiled set is used concurrently without coordination.
//!
//! # Design Decisions
//! - Flags are inline per pattern, so the fast-path alternation keeps each
//!   pattern's exact semantics
//! - Nothing here fires on a bare apostrophe (O'Connor, It's)
//! - Only simple alternations and bounded quantifiers; the `regex` crate
//!   guarantees linear-time matching regardless

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Attack family a match is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreatCategory {
    SqlInjection,
    Xss,
    PathTraversal,
    PrototypePollution,
    NoSqlInjection,
    /// Synthetic category raised by the depth guard.
    DeeplyNested,
}

impl ThreatCategory {
    /// Human-readable label used in log lines.
    pub fn label(self) -> &'static str {
        match self {
            ThreatCategory::SqlInjection => "SQL Injection",
            ThreatCategory::Xss => "XSS",
            ThreatCategory::PathTraversal => "Path Traversal",
            ThreatCategory::PrototypePollution => "Prototype Pollution",
            ThreatCategory::NoSqlInjection => "NoSQL Injection",
            ThreatCategory::DeeplyNested => "Deeply Nested Payload",
        }
    }

    /// Label value for metrics.
    pub fn metric_label(self) -> &'static str {
        match self {
            ThreatCategory::SqlInjection => "sql_injection",
            ThreatCategory::Xss => "xss",
            ThreatCategory::PathTraversal => "path_traversal",
            ThreatCategory::PrototypePollution => "prototype_pollution",
            ThreatCategory::NoSqlInjection => "nosql_injection",
            ThreatCategory::DeeplyNested => "deeply_nested",
        }
    }
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single compiled attack pattern.
#[derive(Debug)]
pub struct Signature {
    pub category: ThreatCategory,
    pub description: &'static str,
    pub pattern: Regex,
}

impl Signature {
    fn compile(category: ThreatCategory, description: &'static str, source: &str) -> Self {
        let pattern = Regex::new(source)
            .unwrap_or_else(|e| panic!("invalid {} signature {:?}: {}", category, description, e));
        Self {
            category,
            description,
            pattern,
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Regex source, for server-side logs only.
    pub fn source(&self) -> &str {
        self.pattern.as_str()
    }
}

const SQL_INJECTION_SOURCES: &[(&str, &str)] = &[
    ("UNION SELECT", r"(?i)\bUNION\s+SELECT\b"),
    ("DROP TABLE", r"(?i)\bDROP\s+TABLE\b"),
    ("ALTER TABLE", r"(?i)\bALTER\s+TABLE\b"),
    ("EXEC call", r"(?i)\bEXEC\s*\("),
    ("OR tautology", r#"(?i)\bOR\s+['"]?\w+['"]?\s*=\s*['"]?\w+['"]?"#),
    ("line comment", r"\s--\s"),
    ("block comment", r"/\*.*\*/"),
    ("stacked DROP", r"(?i);\s*DROP\s+"),
    ("stacked DELETE", r"(?i);\s*DELETE\s+"),
];

const XSS_SOURCES: &[(&str, &str)] = &[
    ("script tag", r"(?is)<script.*?>.*?</script>"),
    ("javascript URI", r"(?i)javascript:"),
    ("inline event handler", r#"(?i)on\w+\s*=\s*(?:['"].*?['"]|[^>\s]+)"#),
    ("iframe tag", r"(?is)<iframe.*?>.*?</iframe>"),
    ("object tag", r"(?is)<object.*?>.*?</object>"),
    ("embed tag", r"(?is)<embed.*?>.*?</embed>"),
];

const PATH_TRAVERSAL_SOURCES: &[(&str, &str)] = &[
    ("dot-dot-slash", r"\.\./"),
    ("encoded dot-dot-slash", r"(?i)\.\.%2F"),
];

const PROTOTYPE_POLLUTION_SOURCES: &[(&str, &str)] = &[("__proto__ token", r"__proto__")];

fn compile_all(category: ThreatCategory, sources: &[(&'static str, &str)]) -> Vec<Signature> {
    sources
        .iter()
        .map(|&(description, source)| Signature::compile(category, description, source))
        .collect()
}

pub static SQL_INJECTION: LazyLock<Vec<Signature>> =
    LazyLock::new(|| compile_all(ThreatCategory::SqlInjection, SQL_INJECTION_SOURCES));

pub static XSS: LazyLock<Vec<Signature>> =
    LazyLock::new(|| compile_all(ThreatCategory::Xss, XSS_SOURCES));

pub static PATH_TRAVERSAL: LazyLock<Vec<Signature>> =
    LazyLock::new(|| compile_all(ThreatCategory::PathTraversal, PATH_TRAVERSAL_SOURCES));

pub static PROTOTYPE_POLLUTION: LazyLock<Vec<Signature>> = LazyLock::new(|| {
    compile_all(ThreatCategory::PrototypePollution, PROTOTYPE_POLLUTION_SOURCES)
});

/// Object keys that rewire an object's prototype chain when assigned.
pub const FORBIDDEN_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// Document-database operators are keys with this prefix (`$ne`, `$gt`, ...).
pub const OPERATOR_KEY_PREFIX: char = '$';

/// Signatures applied to string values, in tie-break order.
pub fn value_signatures() -> impl Iterator<Item = &'static Signature> {
    SQL_INJECTION
        .iter()
        .chain(XSS.iter())
        .chain(PATH_TRAVERSAL.iter())
}

/// Every regex signature, including the URL-only pollution token.
pub fn all() -> impl Iterator<Item = &'static Signature> {
    value_signatures().chain(PROTOTYPE_POLLUTION.iter())
}
