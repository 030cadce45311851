//! Top-level error type for starting and running the gateway.

use axum::http::uri::InvalidUri;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid upstream address {address:?}: {source}")]
    Upstream {
        address: String,
        #[source]
        source: InvalidUri,
    },

    #[error("metrics exporter failed: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
