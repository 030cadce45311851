//! Recursive payload scanner.
//!
//! Walks a parsed query or body depth-first and reports the first node that
//! matches a signature or a forbidden key. Arrays are visited in index order,
//! objects in insertion order (`serde_json` is built with `preserve_order`).
//!
//! # Design Decisions
//! - Depth is tracked explicitly; anything deeper than `max_depth` is itself
//!   a threat, so recursion never exceeds `max_depth + 1` frames
//! - Key checks run before the key's value is visited
//! - The path is bookkeeping for diagnostics and never affects a decision

use serde_json::Value;
use std::fmt;

use crate::waf::fast_path;
use crate::waf::raw_json::{RawEvent, RawJson};
use crate::waf::signatures::{
    self, Signature, ThreatCategory, FORBIDDEN_KEYS, OPERATOR_KEY_PREFIX,
};

/// Default nesting limit.
pub const MAX_DEPTH: usize = 20;

/// Default length of the offending value kept for logs.
pub const EXCERPT_CHARS: usize = 100;

/// One step from a container into a child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a node inside a payload.
///
/// Displays as `items[0].name`: indices attach directly, keys are joined with `.`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPath(Vec<PathSegment>);

impl ScanPath {
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn with(&self, segment: PathSegment) -> Self {
        let mut path = self.clone();
        path.0.push(segment);
        path
    }
}

impl fmt::Display for ScanPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
                PathSegment::Key(key) if i == 0 => f.write_str(key)?,
                PathSegment::Key(key) => write!(f, ".{}", key)?,
            }
        }
        Ok(())
    }
}

/// The first threat found in a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatMatch {
    pub category: ThreatCategory,
    /// Short name of the signature or rule that fired.
    pub pattern: &'static str,
    /// Regex source of the signature, when a regex fired.
    pub regex: Option<&'static str>,
    pub path: ScanPath,
    /// Offending value, truncated for logging.
    pub excerpt: String,
}

/// Per-call traversal state. Never shared between scans.
#[derive(Debug, Default)]
struct ScanContext {
    depth: usize,
    path: ScanPath,
}

impl ScanContext {
    fn descend<R>(&mut self, segment: PathSegment, f: impl FnOnce(&mut Self) -> R) -> R {
        self.path.0.push(segment);
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        self.path.0.pop();
        result
    }
}

/// Stateless scanner; cheap to copy into every request.
#[derive(Debug, Clone, Copy)]
pub struct Scanner {
    max_depth: usize,
    excerpt_chars: usize,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(MAX_DEPTH, EXCERPT_CHARS)
    }
}

impl Scanner {
    pub fn new(max_depth: usize, excerpt_chars: usize) -> Self {
        Self {
            max_depth,
            excerpt_chars,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Scan a parsed query or body. `null` has nothing to scan.
    pub fn scan(&self, payload: &Value) -> Option<ThreatMatch> {
        if payload.is_null() {
            return None;
        }
        let mut ctx = ScanContext::default();
        self.visit(payload, &mut ctx)
    }

    /// Scan a lone string with the value signatures.
    pub fn scan_text(&self, text: &str) -> Option<ThreatMatch> {
        self.match_text(text, &ScanContext::default())
    }

    /// Scan a decoded request URL.
    ///
    /// The pollution token is checked first: query-string encodings such as
    /// `?__proto__[x]=1` never surface as an object key after parsing.
    pub fn scan_url(&self, url: &str) -> Option<ThreatMatch> {
        let ctx = ScanContext::default();
        signatures::PROTOTYPE_POLLUTION
            .iter()
            .find(|sig| sig.is_match(url))
            .map(|sig| self.signature_match(sig, url, &ctx))
            .or_else(|| self.match_text(url, &ctx))
    }

    /// Scan JSON text that did not parse.
    ///
    /// Nothing is skipped for lack of a tree: nesting past `max_depth`, key
    /// rules on every quoted key and value signatures on every string
    /// literal apply in document order, then the whole text is matched once.
    pub fn scan_raw_json(&self, text: &str) -> Option<ThreatMatch> {
        let ctx = ScanContext::default();
        RawJson::new(text)
            .find_map(|event| match event {
                RawEvent::Open { depth } if depth > self.max_depth => {
                    Some(self.too_deep(depth, &ctx))
                }
                RawEvent::Open { .. } => None,
                RawEvent::Key(key) => self.match_key(&key, &ctx),
                RawEvent::Text(literal) => self.match_text(&literal, &ctx),
            })
            .or_else(|| self.match_text(text, &ctx))
    }

    fn visit(&self, node: &Value, ctx: &mut ScanContext) -> Option<ThreatMatch> {
        if ctx.depth > self.max_depth {
            return Some(self.too_deep(ctx.depth, ctx));
        }

        match node {
            Value::String(text) => self.match_text(text, ctx),
            Value::Array(items) => items.iter().enumerate().find_map(|(index, item)| {
                ctx.descend(PathSegment::Index(index), |ctx| self.visit(item, ctx))
            }),
            Value::Object(map) => {
                for (key, value) in map {
                    if let Some(threat) = self.match_key(key, ctx) {
                        return Some(threat);
                    }
                    let found =
                        ctx.descend(PathSegment::Key(key.clone()), |ctx| self.visit(value, ctx));
                    if found.is_some() {
                        return found;
                    }
                }
                None
            }
            Value::Number(_) | Value::Bool(_) | Value::Null => None,
        }
    }

    fn too_deep(&self, depth: usize, ctx: &ScanContext) -> ThreatMatch {
        ThreatMatch {
            category: ThreatCategory::DeeplyNested,
            pattern: "nesting depth limit",
            regex: None,
            path: ctx.path.clone(),
            excerpt: format!("depth {} exceeds {}", depth, self.max_depth),
        }
    }

    fn match_key(&self, key: &str, ctx: &ScanContext) -> Option<ThreatMatch> {
        let (category, pattern) = if FORBIDDEN_KEYS.contains(&key) {
            (ThreatCategory::PrototypePollution, "forbidden object key")
        } else if key.starts_with(OPERATOR_KEY_PREFIX) {
            (ThreatCategory::NoSqlInjection, "operator key")
        } else {
            return None;
        };

        Some(ThreatMatch {
            category,
            pattern,
            regex: None,
            path: ctx.path.with(PathSegment::Key(key.to_string())),
            excerpt: excerpt(key, self.excerpt_chars),
        })
    }

    fn match_text(&self, text: &str, ctx: &ScanContext) -> Option<ThreatMatch> {
        if !fast_path::is_suspicious(text) {
            return None;
        }
        signatures::value_signatures()
            .find(|sig| sig.is_match(text))
            .map(|sig| self.signature_match(sig, text, ctx))
    }

    fn signature_match(
        &self,
        sig: &'static Signature,
        text: &str,
        ctx: &ScanContext,
    ) -> ThreatMatch {
        ThreatMatch {
            category: sig.category,
            pattern: sig.description,
            regex: Some(sig.source()),
            path: ctx.path.clone(),
            excerpt: excerpt(text, self.excerpt_chars),
        }
    }
}

/// Truncate to `limit` characters, marking the cut with `...`.
pub fn excerpt(value: &str, limit: usize) -> String {
    match value.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &value[..cut]),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scan(payload: Value) -> Option<ThreatMatch> {
        Scanner::default().scan(&payload)
    }

    fn nested(levels: usize, leaf: Value) -> Value {
        (0..levels).fold(leaf, |inner, _| json!({ "a": inner }))
    }

    #[test]
    fn test_null_payload_is_clean() {
        assert!(scan(Value::Null).is_none());
    }

    #[test]
    fn test_scalars_are_clean() {
        assert!(scan(json!({"age": 30, "vip": true, "note": null})).is_none());
    }

    #[test]
    fn test_string_match_reports_path() {
        let threat = scan(json!({"comment": "<script>alert(1)</script>"})).unwrap();
        assert_eq!(threat.category, ThreatCategory::Xss);
        assert_eq!(threat.path.to_string(), "comment");
        assert_eq!(threat.pattern, "script tag");
    }

    #[test]
    fn test_first_index_wins() {
        let threat = scan(json!(["<script>x</script>", "UNION SELECT 1"])).unwrap();
        assert_eq!(threat.category, ThreatCategory::Xss);
        assert_eq!(threat.path.to_string(), "[0]");
    }

    #[test]
    fn test_mixed_path_formatting() {
        let threat = scan(json!({"items": [{"ok": 1}, {"name": "../etc"}]})).unwrap();
        assert_eq!(threat.category, ThreatCategory::PathTraversal);
        assert_eq!(threat.path.to_string(), "items[1].name");
    }

    #[test]
    fn test_operator_key_blocked() {
        let threat = scan(json!({"username": {"$ne": null}})).unwrap();
        assert_eq!(threat.category, ThreatCategory::NoSqlInjection);
        assert_eq!(threat.path.to_string(), "username.$ne");
    }

    #[test]
    fn test_trailing_dollar_key_allowed() {
        assert!(scan(json!({"price$": 100})).is_none());
    }

    #[test]
    fn test_forbidden_keys_blocked() {
        for key in ["__proto__", "constructor", "prototype"] {
            let mut map = serde_json::Map::new();
            map.insert(key.to_string(), json!({"polluted": true}));
            let threat = scan(Value::Object(map)).unwrap();
            assert_eq!(threat.category, ThreatCategory::PrototypePollution);
            assert_eq!(threat.path.to_string(), key);
        }
    }

    #[test]
    fn test_key_check_precedes_value() {
        let threat = scan(json!({"constructor": {"x": "UNION SELECT 1"}})).unwrap();
        assert_eq!(threat.category, ThreatCategory::PrototypePollution);
    }

    #[test]
    fn test_object_order_is_insertion_order() {
        let payload: Value =
            serde_json::from_str(r#"{"z": "javascript:x", "a": "UNION SELECT 1"}"#).unwrap();
        let threat = scan(payload).unwrap();
        assert_eq!(threat.path.to_string(), "z");
        assert_eq!(threat.category, ThreatCategory::Xss);
    }

    #[test]
    fn test_depth_limit() {
        let deep = scan(nested(21, json!("harmless"))).unwrap();
        assert_eq!(deep.category, ThreatCategory::DeeplyNested);
        assert_eq!(deep.path.segments().len(), 21);

        assert!(scan(nested(19, json!("harmless"))).is_none());
        assert!(scan(nested(20, json!("harmless"))).is_none());
    }

    #[test]
    fn test_depth_limit_ignores_leaf_content() {
        let deep = scan(nested(21, json!(42))).unwrap();
        assert_eq!(deep.category, ThreatCategory::DeeplyNested);
    }

    #[test]
    fn test_custom_depth_limit() {
        let scanner = Scanner::new(3, EXCERPT_CHARS);
        assert!(scanner.scan(&nested(3, json!(1))).is_none());
        let threat = scanner.scan(&nested(4, json!(1))).unwrap();
        assert_eq!(threat.category, ThreatCategory::DeeplyNested);
    }

    #[test]
    fn test_scan_url_pollution_first() {
        let threat = Scanner::default()
            .scan_url("/test?__proto__[x]=1")
            .unwrap();
        assert_eq!(threat.category, ThreatCategory::PrototypePollution);
        assert!(threat.path.is_empty());
    }

    #[test]
    fn test_scan_url_general_signatures() {
        let threat = Scanner::default().scan_url("/test/admin' OR 1=1").unwrap();
        assert_eq!(threat.category, ThreatCategory::SqlInjection);
        assert!(Scanner::default().scan_url("/test/12345?q=search&page=1").is_none());
    }

    #[test]
    fn test_raw_json_depth_limit() {
        let deep = format!("{}{{\"$ne\":null}}{}", "{\"a\":".repeat(200), "}".repeat(200));
        assert!(serde_json::from_str::<Value>(&deep).is_err());
        let threat = Scanner::default().scan_raw_json(&deep).unwrap();
        assert_eq!(threat.category, ThreatCategory::DeeplyNested);

        let shallow = format!("{}\"ok\"", "[".repeat(20));
        assert!(Scanner::default().scan_raw_json(&shallow).is_none());
    }

    #[test]
    fn test_raw_json_key_rules() {
        let body = r#"{"x":"\ud800","username":{"$ne":null},"__proto__":{"isAdmin":true}}"#;
        assert!(serde_json::from_str::<Value>(body).is_err());
        let threat = Scanner::default().scan_raw_json(body).unwrap();
        assert_eq!(threat.category, ThreatCategory::NoSqlInjection);
        assert_eq!(threat.path.to_string(), "$ne");

        let threat = Scanner::default()
            .scan_raw_json(r#"{"\u0063onstructor": {"x": "\udc00"}}"#)
            .unwrap();
        assert_eq!(threat.category, ThreatCategory::PrototypePollution);
    }

    #[test]
    fn test_raw_json_escaped_values() {
        let threat = Scanner::default()
            .scan_raw_json(r#"{"c": "\u003cscript>alert(1)\u003c/script>", "x": "\ud800"}"#)
            .unwrap();
        assert_eq!(threat.category, ThreatCategory::Xss);
        assert!(Scanner::default().scan_raw_json(r#"{"a": "fine""#).is_none());
    }

    #[test]
    fn test_excerpt_truncation() {
        let long = "x".repeat(150);
        let cut = excerpt(&long, 100);
        assert_eq!(cut.len(), 103);
        assert!(cut.ends_with("..."));
        assert_eq!(excerpt("short", 100), "short");
        assert_eq!(excerpt(&"é".repeat(100), 100), "é".repeat(100));
    }
}
