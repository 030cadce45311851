//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::uri::Authority;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// Largest nesting limit accepted; JSON bodies are parsed with a recursion cap of 128.
pub const MAX_DEPTH_CEILING: usize = 64;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }

    if !is_authority(&config.upstream.address) {
        errors.push(ValidationError::new(
            "upstream.address",
            format!("{:?} is not a host:port authority", config.upstream.address),
        ));
    }

    if config.upstream.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "upstream.request_timeout_secs",
            "must be greater than zero",
        ));
    }

    if config.waf.max_depth == 0 || config.waf.max_depth > MAX_DEPTH_CEILING {
        errors.push(ValidationError::new(
            "waf.max_depth",
            format!("must be between 1 and {}", MAX_DEPTH_CEILING),
        ));
    }

    if config.waf.max_body_bytes == 0 {
        errors.push(ValidationError::new(
            "waf.max_body_bytes",
            "must be greater than zero",
        ));
    }

    if config.waf.excerpt_chars == 0 {
        errors.push(ValidationError::new(
            "waf.excerpt_chars",
            "must be greater than zero",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "{:?} is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `host:port` with nothing else attached.
fn is_authority(address: &str) -> bool {
    match address.parse::<Authority>() {
        Ok(authority) => {
            authority.port_u16().is_some()
                && !authority.host().is_empty()
                && !address.contains('@')
        }
        Err(_) => false,
    }
}
