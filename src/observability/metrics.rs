//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_requests_total` (counter): requests by method, status
//! - `guard_request_duration_seconds` (histogram): latency distribution
//! - `guard_rejections_total` (counter): pipeline rejections by code
//! - `guard_rate_limited_total` (counter): throttled requests by kind
//! - `guard_credential_checks_total` (counter): provider validations by outcome
//! - `guard_tracked_clients` (gauge): live rate-limit and usage entries

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "guard_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("guard_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(code: &'static str) {
    metrics::counter!("guard_rejections_total", "code" => code).increment(1);
}

pub fn record_rate_limited(kind: &'static str) {
    metrics::counter!("guard_rate_limited_total", "kind" => kind).increment(1);
}

pub fn record_credential_check(provider: &'static str, valid: bool) {
    metrics::counter!(
        "guard_credential_checks_total",
        "provider" => provider,
        "result" => if valid { "valid" } else { "invalid" }
    )
    .increment(1);
}

pub fn record_tracked_clients(kind: &'static str, count: usize) {
    metrics::gauge!("guard_tracked_clients", "kind" => kind).set(count as f64);
}
