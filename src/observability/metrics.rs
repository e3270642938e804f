//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, rejections, breaker state)
//! - Expose Prometheus text through `GET /metrics`
//! - Refresh process/runtime gauges on every scrape
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_requests_in_flight` (gauge)
//! - `gateway_rate_limited_total` (counter): rejections by tier
//! - `gateway_auth_failures_total` (counter): rejections by reason
//! - `gateway_circuit_breaker_state` (gauge): 0 closed, 1 open, 2 half-open
//! - `gateway_circuit_breaker_transitions_total` (counter)
//! - `gateway_upstream_requests_total` (counter): by service, outcome
//! - `gateway_upstream_duration_seconds` (histogram)
//! - `gateway_jwks_refresh_total` (counter): by outcome
//! - `gateway_service_health` (gauge): 1 healthy, 0 unhealthy
//! - `gateway_panics_recovered_total` (counter)
//! - `gateway_uptime_seconds`, `gateway_runtime_workers`,
//!   `gateway_runtime_alive_tasks`, `gateway_build_info` (gauges)
//!
//! # Design Decisions
//! - The `metrics` facade is a no-op until a recorder is installed, so
//!   components record unconditionally
//! - The recorder is process-wide and installed at most once

use std::sync::OnceLock;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::resilience::BreakerState;

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();
static STARTED: OnceLock<Instant> = OnceLock::new();

/// Install the Prometheus recorder. Later calls return the same handle.
pub fn init_metrics() -> Option<PrometheusHandle> {
    STARTED.get_or_init(Instant::now);
    HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new()
                .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), LATENCY_BUCKETS);
            let installed = builder.and_then(|b| b.install_recorder());
            match installed {
                Ok(handle) => Some(handle),
                Err(err) => {
                    tracing::error!(error = %err, "Failed to install metrics recorder");
                    None
                }
            }
        })
        .clone()
}

/// Render the exposition text, refreshing runtime gauges first.
pub fn render(handle: &PrometheusHandle) -> String {
    record_runtime();
    handle.render()
}

fn record_runtime() {
    if let Some(started) = STARTED.get() {
        gauge!("gateway_uptime_seconds").set(started.elapsed().as_secs_f64());
    }
    gauge!("gateway_build_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
        let m = runtime.metrics();
        gauge!("gateway_runtime_workers").set(m.num_workers() as f64);
        gauge!("gateway_runtime_alive_tasks").set(m.num_alive_tasks() as f64);
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn inc_in_flight() {
    gauge!("gateway_requests_in_flight").increment(1.0);
}

pub fn dec_in_flight() {
    gauge!("gateway_requests_in_flight").decrement(1.0);
}

pub fn record_rate_limited(tier: &str) {
    counter!("gateway_rate_limited_total", "tier" => tier.to_string()).increment(1);
}

pub fn record_auth_failure(reason: &'static str) {
    counter!("gateway_auth_failures_total", "reason" => reason).increment(1);
}

pub fn record_breaker_state(service: &str, state: BreakerState) {
    gauge!("gateway_circuit_breaker_state", "service" => service.to_string()).set(state.as_gauge());
}

pub fn record_breaker_transition(service: &str, to: BreakerState) {
    counter!(
        "gateway_circuit_breaker_transitions_total",
        "service" => service.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
}

/// Record one upstream call. `outcome` is `success`, `error` or `timeout`.
pub fn record_upstream(service: &str, outcome: &'static str, start: Instant) {
    counter!(
        "gateway_upstream_requests_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("gateway_upstream_duration_seconds", "service" => service.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_jwks_refresh(outcome: &'static str) {
    counter!("gateway_jwks_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_service_health(service: &str, healthy: bool) {
    gauge!("gateway_service_health", "service" => service.to_string()).set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_panic() {
    counter!("gateway_panics_recovered_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_render_contains_recorded_series() {
        let Some(handle) = init_metrics() else {
            return;
        };
        record_request("GET", 200, Instant::now());
        record_rate_limited("global");

        let text = render(&handle);
        assert!(text.contains("gateway_requests_total"));
        assert!(text.contains("gateway_rate_limited_total"));
        assert!(text.contains("gateway_runtime_workers"));
    }
}
