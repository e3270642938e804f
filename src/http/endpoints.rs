//! Gateway-owned endpoints: `/health` and `/metrics`.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::GatewayError;
use crate::health::HealthReport;
use crate::http::middleware::context_of;
use crate::http::server::AppState;
use crate::observability::metrics;

pub const HEALTH_PATH: &str = "/health";
pub const METRICS_PATH: &str = "/metrics";

#[derive(Debug, Serialize)]
struct HealthBody<'a> {
    gateway: &'a str,
    version: &'a str,
    #[serde(flatten)]
    report: HealthReport,
}

/// Aggregate service health. 200 only when every polled service is healthy.
///
/// Services with health checks disabled are not polled and are left out of
/// `perService`; polled services read `unknown` until their first probe.
pub async fn health(State(state): State<AppState>) -> Response {
    let report = state.inner.health.report();
    let status = report.status_code();
    let gateway = &state.inner.config.gateway;

    let body = HealthBody {
        gateway: &gateway.name,
        version: &gateway.version,
        report,
    };
    (status, Json(body)).into_response()
}

/// Prometheus text exposition; a missing route when metrics are disabled.
pub async fn metrics(State(state): State<AppState>, req: Request<Body>) -> Response {
    let Some(handle) = state.inner.metrics.as_ref() else {
        return context_of(&req).error(&GatewayError::RouteNotFound);
    };

    let mut response = metrics::render(handle).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}
