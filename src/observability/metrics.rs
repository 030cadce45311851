//! Metrics collection and exposition.
//!
//! # Metrics
//! - `waf_requests_scanned_total` (counter): requests inspected by the gate
//! - `waf_requests_blocked_total` (counter): blocks by category and source
//! - `waf_scan_duration_seconds` (histogram): payload extraction + scan time
//! - `gateway_requests_total` (counter): forwarded requests by method, status
//! - `gateway_request_duration_seconds` (histogram): upstream round-trip latency

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

use crate::waf::{ScanSource, ThreatCategory};

/// Install the Prometheus exporter with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_scan(start: Instant) {
    counter!("waf_requests_scanned_total").increment(1);
    histogram!("waf_scan_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_blocked(category: ThreatCategory, source: ScanSource) {
    counter!(
        "waf_requests_blocked_total",
        "category" => category.metric_label(),
        "source" => source.as_str()
    )
    .increment(1);
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}
