//! Storefront WAF gateway library.
//!
//! Inspects every inbound request's query string, body and URL for injection
//! attacks (SQL, XSS, NoSQL operators, path traversal, prototype pollution)
//! before the storefront sees it.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod waf;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use waf::{waf_middleware, Scanner, ThreatCategory, ThreatMatch, WafState};
