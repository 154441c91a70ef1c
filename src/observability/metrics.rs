//! Prometheus metrics.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route class and status
//! - `gateway_request_duration_seconds` (histogram): latency by route class
//! - `gateway_gate_rejections_total` (counter): rejections by gate and reason
//! - `gateway_rate_limited_total` (counter): requests answered with 429
//! - `gateway_tool_invocations_total` (counter): tool runs by tool and outcome
//! - `gateway_rate_windows` (gauge): identities with a live rate window

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            gauge!("gateway_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
            tracing::info!(address = %addr, "Prometheus exporter listening");
        }
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn record_request(route: &str, status: u16, start: Instant) {
    let labels = [("route", route.to_string()), ("status", status.to_string())];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_gate_rejection(gate: &'static str, reason: &'static str) {
    counter!("gateway_gate_rejections_total", "gate" => gate, "reason" => reason).increment(1);
}

pub fn record_rate_limited() {
    counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_tool_invocation(tool: &'static str, outcome: &'static str) {
    counter!("gateway_tool_invocations_total", "tool" => tool, "outcome" => outcome).increment(1);
}

pub fn record_rate_windows(tracked: usize) {
    gauge!("gateway_rate_windows").set(tracked as f64);
}
