//! Tree-free lexer for JSON text that `serde_json` refused.
//!
//! Bodies can fail to parse for reasons the storefront's own parser does not
//! share (recursion limit, lone surrogate escapes). The lexer recovers just
//! enough structure to keep the depth guard and the key rules in force:
//! container nesting, quoted keys and quoted values, in document order.

use std::iter::Peekable;
use std::str::Chars;

/// One piece of structure recovered from raw JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// A `{` or `[` opened; `depth` counts the containers now open.
    Open { depth: usize },
    /// A string literal followed by `:`, escapes decoded.
    Key(String),
    /// Any other string literal, escapes decoded.
    Text(String),
}

#[derive(Debug, Clone)]
pub struct RawJson<'a> {
    chars: Peekable<Chars<'a>>,
    depth: usize,
}

impl<'a> RawJson<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            depth: 0,
        }
    }

    fn string_literal(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.chars.next() {
            match c {
                '"' => break,
                '\\' => match self.chars.next() {
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('b') => out.push('\u{8}'),
                    Some('f') => out.push('\u{c}'),
                    Some('u') => out.push(self.unicode_escape()),
                    Some(other) => out.push(other),
                    None => break,
                },
                c => out.push(c),
            }
        }
        out
    }

    fn hex4(&mut self) -> Option<u32> {
        let mut code = 0;
        for _ in 0..4 {
            let digit = self.chars.next_if(char::is_ascii_hexdigit)?.to_digit(16)?;
            code = code * 16 + digit;
        }
        Some(code)
    }

    /// Decode the digits after `\u`. Surrogate pairs are joined; a lone
    /// surrogate becomes U+FFFD, as lenient parsers would store it.
    fn unicode_escape(&mut self) -> char {
        let Some(high) = self.hex4() else {
            return char::REPLACEMENT_CHARACTER;
        };

        if (0xD800..0xDC00).contains(&high) {
            let mut ahead = self.clone();
            if ahead.chars.next_if_eq(&'\\').is_some() && ahead.chars.next_if_eq(&'u').is_some() {
                if let Some(low) = ahead.hex4().filter(|low| (0xDC00..0xE000).contains(low)) {
                    *self = ahead;
                    let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                    return char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
                }
            }
        }

        char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER)
    }
}

impl Iterator for RawJson<'_> {
    type Item = RawEvent;

    fn next(&mut self) -> Option<RawEvent> {
        while let Some(c) = self.chars.next() {
            match c {
                '{' | '[' => {
                    self.depth += 1;
                    return Some(RawEvent::Open { depth: self.depth });
                }
                '}' | ']' => self.depth = self.depth.saturating_sub(1),
                '"' => {
                    let literal = self.string_literal();
                    while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
                    return Some(if self.chars.peek() == Some(&':') {
                        RawEvent::Key(literal)
                    } else {
                        RawEvent::Text(literal)
                    });
                }
                _ => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(text: &str) -> Vec<RawEvent> {
        RawJson::new(text).collect()
    }

    #[test]
    fn test_keys_and_values() {
        assert_eq!(
            events(r#"{"name" : "x", "tags": ["a"]"#),
            vec![
                RawEvent::Open { depth: 1 },
                RawEvent::Key("name".to_string()),
                RawEvent::Text("x".to_string()),
                RawEvent::Key("tags".to_string()),
                RawEvent::Open { depth: 2 },
                RawEvent::Text("a".to_string()),
            ]
        );
    }

    #[test]
    fn test_brackets_inside_strings_ignored() {
        let depths: Vec<_> = events(r#"{"a": "{[{[", "b": {}}"#)
            .into_iter()
            .filter_map(|e| match e {
                RawEvent::Open { depth } => Some(depth),
                _ => None,
            })
            .collect();
        assert_eq!(depths, vec![1, 2]);
    }

    #[test]
    fn test_closing_brackets_reduce_depth() {
        let last = events("[[[]], [").pop().unwrap();
        assert_eq!(last, RawEvent::Open { depth: 2 });
    }

    #[test]
    fn test_escapes_decoded() {
        assert_eq!(
            events(r#"{"$ne": "say \"hi\"\n"}"#)[1..],
            [
                RawEvent::Key("$ne".to_string()),
                RawEvent::Text("say \"hi\"\n".to_string()),
            ]
        );
    }

    #[test]
    fn test_surrogates() {
        assert_eq!(
            events(r#"["\ud83d\ude00", "\ud800x"]"#)[1..],
            [
                RawEvent::Text("\u{1F600}".to_string()),
                RawEvent::Text("\u{FFFD}x".to_string()),
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            events(r#"{"a": "open"#),
            vec![
                RawEvent::Open { depth: 1 },
                RawEvent::Key("a".to_string()),
                RawEvent::Text("open".to_string()),
            ]
        );
    }
}
