//! Request metrics.
//!
//! # Metrics
//! - `routemux_requests_total` (counter): requests by method, pattern, status
//! - `routemux_request_duration_seconds` (histogram): dispatch latency
//!
//! # Design Decisions
//! - Labels use the matched pattern, never the raw path, to bound cardinality
//! - Extension methods share the `other` method label
//! - Recording is a no-op until a recorder is installed

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, address = %addr, "Failed to install metrics exporter"),
    }
}

const KNOWN_METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH", "CONNECT", "TRACE",
];

/// Label value for a request method.
fn method_label(method: &str) -> &'static str {
    KNOWN_METHODS
        .iter()
        .find(|known| **known == method)
        .copied()
        .unwrap_or("other")
}

/// Record one dispatched request.
pub fn record_request(method: &str, pattern: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method_label(method).to_string()),
        ("pattern", pattern.to_string()),
        ("status", status.to_string()),
    ];
    counter!("routemux_requests_total", &labels).increment(1);
    histogram!("routemux_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}
