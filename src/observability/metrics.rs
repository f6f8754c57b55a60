//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): inbound requests by route, status
//! - `gateway_request_duration_seconds` (histogram): inbound latency by route
//! - `gateway_upstream_calls_total` (counter): upstream calls by service, outcome
//! - `gateway_upstream_duration_seconds` (histogram): upstream latency by service
//! - `gateway_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `gateway_breaker_transitions_total` (counter): transitions by target state
//! - `gateway_fallbacks_total` (counter): fallback answers by reason
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::BreakerState;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_request(route: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_call(service: &str, outcome: &'static str, start: Instant) {
    counter!(
        "gateway_upstream_calls_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("gateway_upstream_duration_seconds", "service" => service.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_breaker_state(service: &str, operation: &str, state: BreakerState) {
    gauge!(
        "gateway_breaker_state",
        "service" => service.to_string(),
        "operation" => operation.to_string()
    )
    .set(state.as_gauge());
}

pub fn record_breaker_transition(service: &str, operation: &str, to: BreakerState) {
    counter!(
        "gateway_breaker_transitions_total",
        "service" => service.to_string(),
        "operation" => operation.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
    record_breaker_state(service, operation, to);
}

pub fn record_fallback(reason: &'static str) {
    counter!("gateway_fallbacks_total", "reason" => reason).increment(1);
}
