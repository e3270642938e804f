//! Security headers, request limits and address filtering.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use super::context_of;
use crate::error::GatewayError;
use crate::http::server::AppState;

pub async fn security_headers(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    if state.inner.config.security.enabled {
        state.inner.security_headers.apply(response.headers_mut());
    }
    response
}

pub async fn validation(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if state.inner.config.validation.enabled {
        if let Err(violation) = state.inner.limits.check(req.uri(), req.headers()) {
            let ctx = context_of(&req);
            tracing::warn!(violation = %violation, "Rejected malformed request");
            return ctx.error(&GatewayError::Validation(violation.to_string()));
        }
    }
    next.run(req).await
}

pub async fn ip_filter(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if !state.inner.config.ip_filter.enabled {
        return next.run(req).await;
    }

    let ctx = context_of(&req);
    match ctx.client_ip {
        Some(ip) if state.inner.ip_filter.is_allowed(ip) => next.run(req).await,
        Some(ip) => {
            tracing::warn!(client_ip = %ip, "Client address blocked");
            ctx.error(&GatewayError::IpNotAllowed)
        }
        None => {
            tracing::warn!("Client address unknown, refusing under active filter");
            ctx.error(&GatewayError::IpNotAllowed)
        }
    }
}
