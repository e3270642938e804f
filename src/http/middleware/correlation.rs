//! Correlation IDs and panic recovery.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use futures_util::FutureExt;
use tracing::Instrument;

use super::context_of;
use crate::error::GatewayError;
use crate::http::context::{RequestContext, X_CORRELATION_ID, X_REQUEST_ID};
use crate::http::server::AppState;
use crate::observability::metrics;

/// Create the request context and echo its correlation ID on the response.
pub async fn correlation(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext::from_request(&req, state.inner.config.ip_filter.trust_forwarded_headers);
    let correlation_id = ctx.correlation_id.clone();

    let span = tracing::info_span!(
        "request",
        correlation_id = %correlation_id,
        method = %ctx.method,
        path = %ctx.path,
    );
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        let headers = response.headers_mut();
        headers.insert(X_CORRELATION_ID, value.clone());
        headers.insert(X_REQUEST_ID, value);
    }
    response
}

/// Turn a panic anywhere below into a 500 envelope.
pub async fn recovery(req: Request<Body>, next: Next) -> Response {
    let ctx = context_of(&req);

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            metrics::record_panic();
            tracing::error!(panic = %panic_message(panic.as_ref()), "Request handler panicked");
            ctx.error(&GatewayError::Internal)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
