//! Strict percent-decoding of request URLs.
//!
//! `urlencoding::decode` passes malformed escapes through untouched; the gate
//! needs to know when decoding failed so it can fall back to the raw string.

use std::borrow::Cow;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlDecodeError {
    #[error("malformed percent escape at byte {offset}")]
    MalformedEscape { offset: usize },

    #[error("decoded URL is not valid UTF-8")]
    InvalidUtf8,
}

/// Decode every `%XX` escape. `+` is left alone.
pub fn decode_uri_component(raw: &str) -> Result<Cow<'_, str>, UrlDecodeError> {
    let bytes = raw.as_bytes();
    let mut cursor = 0;
    while let Some(found) = bytes[cursor..].iter().position(|&b| b == b'%') {
        let offset = cursor + found;
        let well_formed = bytes
            .get(offset + 1..offset + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !well_formed {
            return Err(UrlDecodeError::MalformedEscape { offset });
        }
        cursor = offset + 3;
    }

    urlencoding::decode(raw).map_err(|_| UrlDecodeError::InvalidUtf8)
}
