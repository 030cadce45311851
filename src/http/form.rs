//! URL-encoded form and query-string parsing.
//!
//! Produces the same nested shapes an extended query parser does:
//! `a=1&a=2` → `{"a": ["1", "2"]}`, `a[b]=1` → `{"a": {"b": "1"}}`,
//! `a[]=1` → `{"a": ["1"]}`. Keys are kept verbatim (including `__proto__`)
//! so the scanner can judge them.

use serde_json::{Map, Value};

/// Bracket segments honoured per key; the rest stays one literal segment.
pub const MAX_SEGMENTS: usize = 32;

/// Accumulates `name=value` pairs into a nested JSON object.
#[derive(Debug, Default)]
pub struct FormBuilder {
    root: Value,
}

impl FormBuilder {
    pub fn insert(&mut self, key: &str, value: String) {
        let segments = split_key(key);
        assign(&mut self.root, &segments, value);
    }

    pub fn finish(self) -> Value {
        match self.root {
            Value::Null => Value::Object(Map::new()),
            root => root,
        }
    }
}

/// Parse `application/x-www-form-urlencoded` input.
pub fn parse(input: &[u8]) -> Value {
    let mut builder = FormBuilder::default();
    for (key, value) in url::form_urlencoded::parse(input) {
        builder.insert(&key, value.into_owned());
    }
    builder.finish()
}

fn split_key(key: &str) -> Vec<String> {
    let (base, mut rest) = match key.find('[') {
        Some(open) if open > 0 => key.split_at(open),
        _ => return vec![key.to_string()],
    };

    let mut segments = vec![base.to_string()];
    while segments.len() < MAX_SEGMENTS {
        let Some(inner) = rest.strip_prefix('[') else { break };
        let Some(close) = inner.find(']') else { break };
        segments.push(inner[..close].to_string());
        rest = &inner[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(rest.to_string());
    }
    segments
}

fn assign(slot: &mut Value, segments: &[String], value: String) {
    let Some((head, tail)) = segments.split_first() else {
        merge_leaf(slot, value);
        return;
    };

    if head.is_empty() {
        with_array(slot, |items| {
            let mut child = Value::Null;
            assign(&mut child, tail, value);
            items.push(child);
        });
    } else {
        with_object(slot, |map| {
            let child = map.entry(head.clone()).or_insert(Value::Null);
            assign(child, tail, value);
        });
    }
}

fn merge_leaf(slot: &mut Value, value: String) {
    match slot {
        Value::Null => *slot = Value::String(value),
        Value::Array(items) => items.push(Value::String(value)),
        other => {
            let previous = other.take();
            *other = Value::Array(vec![previous, Value::String(value)]);
        }
    }
}

fn with_array(slot: &mut Value, f: impl FnOnce(&mut Vec<Value>)) {
    match slot {
        Value::Array(items) => f(items),
        other => {
            let mut items = match other.take() {
                Value::Null => Vec::new(),
                previous => vec![previous],
            };
            f(&mut items);
            *other = Value::Array(items);
        }
    }
}

fn with_object(slot: &mut Value, f: impl FnOnce(&mut Map<String, Value>)) {
    match slot {
        Value::Object(map) => f(map),
        other => {
            // Earlier values survive under positional keys so nothing escapes the scan.
            let mut map: Map<String, Value> = match other.take() {
                Value::Null => Map::new(),
                Value::Array(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v))
                    .collect(),
                previous => {
                    let mut map = Map::new();
                    map.insert("0".to_string(), previous);
                    map
                }
            };
            f(&mut map);
            *other = Value::Object(map);
        }
    }
}
