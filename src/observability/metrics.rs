//! Metrics collection and exposition.
//!
//! # Metrics
//! - `switchyard_requests_total` (counter): requests by method, status, protocol
//! - `switchyard_request_duration_seconds` (histogram): dispatch latency
//! - `switchyard_active_sessions` (gauge): open WebSocket / EventSource sessions
//! - `switchyard_protocol_violations_total` (counter): WebSocket violations by reason
//! - `switchyard_handler_failures_total` (counter): failed handlers by kind
//!
//! Recording is a no-op until an exporter is installed.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, protocol: &'static str, start: Instant) {
    metrics::counter!(
        "switchyard_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "protocol" => protocol
    )
    .increment(1);
    metrics::histogram!("switchyard_request_duration_seconds", "protocol" => protocol)
        .record(start.elapsed().as_secs_f64());
}

pub fn set_active_sessions(kind: &'static str, count: u64) {
    metrics::gauge!("switchyard_active_sessions", "kind" => kind).set(count as f64);
}

pub fn record_protocol_violation(reason: &'static str) {
    metrics::counter!("switchyard_protocol_violations_total", "reason" => reason).increment(1);
}

pub fn record_handler_failure(kind: &'static str) {
    metrics::counter!("switchyard_handler_failures_total", "kind" => kind).increment(1);
}
