//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → payload.rs (buffer body, build query/body values)
//!         → form.rs (URL-encoded and query strings)
//!         → decode.rs (strict URL percent-decoding)
//!     → waf gate (allow or 403)
//!     → server.rs forward_handler → storefront upstream
//! ```

pub mod decode;
pub mod form;
pub mod payload;
pub mod server;

pub use payload::{ParsedBody, PayloadError, RequestPayload};
pub use server::HttpServer;
