//! Request-payload security scanner.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → http::payload (buffer body, parse query/body into JSON values)
//!     → gate.rs (query → body → decoded URL, first match wins)
//!         → scanner.rs (depth-bounded walk, key rules)
//!             → raw_json.rs (structure of JSON text that did not parse)
//!             → fast_path.rs (one combined regex per string)
//!             → signatures.rs (categorized match on a fast-path hit)
//!     → next handler, or 403 Forbidden
//! ```
//!
//! # Design Decisions
//! - Signatures are process-wide and immutable
//! - Scan state lives on the stack of a single request
//! - Fail closed: undecodable input is scanned raw

pub mod fast_path;
pub mod gate;
pub mod raw_json;
pub mod scanner;
pub mod signatures;

pub use gate::{
    inspect, waf_middleware, BlockedResponse, Detection, ScanSource, WafState, BLOCK_MESSAGE,
    TOO_LARGE_MESSAGE, UNREADABLE_MESSAGE,
};
pub use scanner::{PathSegment, ScanPath, Scanner, ThreatMatch};
pub use signatures::ThreatCategory;
