//! One log line and one metrics sample per request.

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use super::context_of;
use crate::http::proxy::ServedBy;
use crate::observability::metrics;

/// Decrements the in-flight gauge even if the client goes away mid-request.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        metrics::inc_in_flight();
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::dec_in_flight();
    }
}

pub async fn access_log(req: Request<Body>, next: Next) -> Response {
    let ctx = context_of(&req);
    let _in_flight = InFlight::enter();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed_ms = ctx.started_at.elapsed().as_millis() as u64;
    let service = response
        .extensions()
        .get::<ServedBy>()
        .map(|s| s.0.as_str())
        .unwrap_or("-");
    let client_ip = ctx.client_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "-".to_string());

    metrics::record_request(ctx.method.as_str(), status, ctx.started_at);

    if status >= 500 {
        tracing::error!(status, elapsed_ms, service, client_ip = %client_ip, "Request failed");
    } else if status >= 400 {
        tracing::warn!(status, elapsed_ms, service, client_ip = %client_ip, "Request rejected");
    } else {
        tracing::info!(status, elapsed_ms, service, client_ip = %client_ip, "Request completed");
    }

    response
}
