//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::waf::scanner::{EXCERPT_CHARS, MAX_DEPTH};

/// Root configuration for the WAF gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Storefront upstream that allowed requests are forwarded to.
    pub upstream: UpstreamConfig,

    /// Payload scanner settings.
    pub waf: WafConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream (storefront application) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream authority (e.g., "127.0.0.1:3000" or "storefront:3000").
    pub address: String,

    /// Total time allowed for a forwarded request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Payload scanner configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WafConfig {
    /// When false, every request passes through uninspected.
    pub enabled: bool,

    /// Deepest nesting level that is still scanned.
    pub max_depth: usize,

    /// Largest body buffered for inspection, in bytes.
    pub max_body_bytes: usize,

    /// Characters of the offending value kept in logs.
    pub excerpt_chars: usize,

    /// Take the client address from `X-Forwarded-For` when present.
    pub trust_forwarded_for: bool,
}

impl Default for WafConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: MAX_DEPTH,
            max_body_bytes: 1024 * 1024,
            excerpt_chars: EXCERPT_CHARS,
            trust_forwarded_for: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Output format for log lines.
    pub log_format: LogFormat,

    /// Default filter directive; `RUST_LOG` takes precedence.
    pub log_filter: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_filter: "storefront_waf=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
