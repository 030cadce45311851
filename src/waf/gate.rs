//! WAF gate middleware.
//!
//! Runs the scanner over query, body and decoded URL, in that order, and
//! either forwards the request or answers `403 Forbidden`.
//!
//! # Design Decisions
//! - Terminal on the first detection; later stages are never evaluated
//! - A URL that fails to decode is scanned raw, never waved through
//! - The response body carries no pattern or path detail; the log line does

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::{request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use crate::config::WafConfig;
use crate::http::decode::decode_uri_component;
use crate::http::payload::{ParsedBody, RequestPayload};
use crate::observability::metrics;
use crate::waf::scanner::{Scanner, ThreatMatch};

/// Message returned to blocked clients.
pub const BLOCK_MESSAGE: &str =
    "Your request was blocked by the security firewall due to suspicious content.";

/// Part of the request a threat was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSource {
    Query,
    Body,
    Url,
}

impl ScanSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanSource::Query => "query",
            ScanSource::Body => "body",
            ScanSource::Url => "url",
        }
    }
}

impl fmt::Display for ScanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A threat together with where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub source: ScanSource,
    pub threat: ThreatMatch,
}

/// Message returned when the body cannot be buffered for inspection.
pub const TOO_LARGE_MESSAGE: &str = "Request body exceeds the size the security firewall inspects.";

/// Message returned when a body cannot be read to the end.
pub const UNREADABLE_MESSAGE: &str = "Request body could not be read by the security firewall.";

/// JSON body of every response the gate produces itself.
#[derive(Debug, Serialize)]
pub struct BlockedResponse {
    pub error: &'static str,
    pub message: &'static str,
}

fn reject(status: StatusCode, message: &'static str) -> Response {
    let error = status.canonical_reason().unwrap_or("Error");
    (status, Json(BlockedResponse { error, message })).into_response()
}

/// State shared by every invocation of [`waf_middleware`].
#[derive(Debug, Clone)]
pub struct WafState {
    pub config: WafConfig,
    scanner: Scanner,
}

impl WafState {
    pub fn new(config: WafConfig) -> Self {
        let scanner = Scanner::new(config.max_depth, config.excerpt_chars);
        Self { config, scanner }
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }
}

/// Scan query, then body, then the decoded URL. Stops at the first threat.
pub fn inspect(scanner: &Scanner, payload: &RequestPayload) -> Option<Detection> {
    if let Some(threat) = scanner.scan(&payload.query) {
        return Some(Detection {
            source: ScanSource::Query,
            threat,
        });
    }

    let body_threat = match &payload.body {
        ParsedBody::Value(value) => scanner.scan(value),
        ParsedBody::MalformedJson(text) => scanner.scan_raw_json(text),
    };
    if let Some(threat) = body_threat {
        return Some(Detection {
            source: ScanSource::Body,
            threat,
        });
    }

    let url = match decode_uri_component(&payload.url) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::debug!(error = %e, url = %payload.url, "URL decoding failed, scanning raw URL");
            Cow::Borrowed(payload.url.as_str())
        }
    };
    scanner.scan_url(&url).map(|threat| Detection {
        source: ScanSource::Url,
        threat,
    })
}

/// Axum middleware guarding every downstream handler.
pub async fn waf_middleware(
    State(state): State<WafState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.enabled {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, state.config.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(
                error = %e,
                limit = state.config.max_body_bytes,
                "Request body rejected before inspection"
            );
            return reject(StatusCode::PAYLOAD_TOO_LARGE, TOO_LARGE_MESSAGE);
        }
    };

    let start = Instant::now();
    let limit = state.config.max_body_bytes;
    let payload = match RequestPayload::extract(&parts.uri, &parts.headers, &bytes, limit).await {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(
                client_ip = %client_ip(&parts, state.config.trust_forwarded_for),
                error = %e,
                "Request body rejected, could not be inspected"
            );
            return reject(StatusCode::BAD_REQUEST, UNREADABLE_MESSAGE);
        }
    };
    let verdict = inspect(&state.scanner, &payload);
    metrics::record_scan(start);

    match verdict {
        Some(detection) => block(&parts, &state.config, &detection),
        None => next.run(rebuild(parts, bytes)).await,
    }
}

fn rebuild(parts: Parts, bytes: Bytes) -> Request<Body> {
    Request::from_parts(parts, Body::from(bytes))
}

/// Originating client: first `X-Forwarded-For` hop when trusted, else the socket peer.
pub fn client_ip(parts: &Parts, trust_forwarded_for: bool) -> String {
    let forwarded = trust_forwarded_for
        .then(|| parts.headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match forwarded {
        Some(ip) => ip.to_string(),
        None => parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    }
}

fn block(parts: &Parts, config: &WafConfig, detection: &Detection) -> Response {
    let threat = &detection.threat;
    let request_id = parts
        .headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    tracing::warn!(
        client_ip = %client_ip(parts, config.trust_forwarded_for),
        request_id = %request_id,
        source = %detection.source,
        category = %threat.category,
        path = %threat.path,
        pattern = threat.pattern,
        regex = threat.regex.unwrap_or("-"),
        value = %threat.excerpt,
        "WAF blocked suspicious request"
    );
    metrics::record_blocked(threat.category, detection.source);

    reject(StatusCode::FORBIDDEN, BLOCK_MESSAGE)
}
