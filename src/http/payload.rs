//! Structured view of a request for inspection.
//!
//! # Responsibilities
//! - Parse the query string into a nested JSON value
//! - Parse the buffered body according to `Content-Type`
//! - Keep the raw path and query for URL inspection
//!
//! # Design Decisions
//! - JSON, URL-encoded and multipart text fields share one value model
//! - Multipart file contents are not inspected; their text fields are
//! - A JSON body that fails to parse is kept as text for the raw scanner
//! - A multipart body that cannot be read to the end is an error, never a
//!   partial result

use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, FromRequest, Multipart,
    },
    http::{header::CONTENT_TYPE, HeaderMap, Request, Uri},
};
use serde_json::Value;
use thiserror::Error;

use crate::http::form::{self, FormBuilder};

/// Body that could not be turned into something scannable.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("multipart body rejected: {0}")]
    MultipartRejected(#[from] MultipartRejection),

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
}

/// Scannable form of the request body.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    /// Parsed content; `Null` when there is nothing to scan.
    Value(Value),
    /// Text of a JSON body that `serde_json` refused.
    MalformedJson(String),
}

impl Default for ParsedBody {
    fn default() -> Self {
        ParsedBody::Value(Value::Null)
    }
}

/// Everything the gate scans for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPayload {
    pub query: Value,
    pub body: ParsedBody,
    /// Raw, still percent-encoded path and query.
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
    Multipart,
    Opaque,
}

impl RequestPayload {
    /// Build the payload from a buffered request. `limit` bounds the
    /// multipart reader and should match the buffering limit.
    pub async fn extract(
        uri: &Uri,
        headers: &HeaderMap,
        body: &Bytes,
        limit: usize,
    ) -> Result<Self, PayloadError> {
        let query = uri
            .query()
            .map(|q| form::parse(q.as_bytes()))
            .unwrap_or(Value::Null);
        let url = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string());

        Ok(Self {
            query,
            body: parse_body(headers, body, limit).await?,
            url,
        })
    }
}

fn body_kind(headers: &HeaderMap) -> BodyKind {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return BodyKind::Opaque;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "application/json" => BodyKind::Json,
        "application/x-www-form-urlencoded" => BodyKind::Form,
        "multipart/form-data" => BodyKind::Multipart,
        other if other.ends_with("+json") => BodyKind::Json,
        _ => BodyKind::Opaque,
    }
}

async fn parse_body(
    headers: &HeaderMap,
    body: &Bytes,
    limit: usize,
) -> Result<ParsedBody, PayloadError> {
    if body.is_empty() {
        return Ok(ParsedBody::default());
    }

    let value = match body_kind(headers) {
        BodyKind::Json => match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "Malformed JSON body, inspecting raw text");
                return Ok(ParsedBody::MalformedJson(
                    String::from_utf8_lossy(body).into_owned(),
                ));
            }
        },
        BodyKind::Form => form::parse(body),
        BodyKind::Multipart => multipart_fields(headers, body, limit).await?,
        BodyKind::Opaque => Value::Null,
    };
    Ok(ParsedBody::Value(value))
}

/// Collect the text fields of a multipart body. Every part must be readable;
/// one malformed part fails the whole body.
async fn multipart_fields(
    headers: &HeaderMap,
    body: &Bytes,
    limit: usize,
) -> Result<Value, PayloadError> {
    let mut request = Request::new(Body::from(body.clone()));
    if let Some(content_type) = headers.get(CONTENT_TYPE) {
        request
            .headers_mut()
            .insert(CONTENT_TYPE, content_type.clone());
    }
    DefaultBodyLimit::max(limit).apply(&mut request);

    let mut multipart = Multipart::from_request(request, &()).await?;
    let mut fields = FormBuilder::default();
    while let Some(field) = multipart.next_field().await? {
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        let data = field.bytes().await?;
        fields.insert(&name, String::from_utf8_lossy(&data).into_owned());
    }
    Ok(fields.finish())
}
