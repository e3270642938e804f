//! CORS stage.
//!
//! Preflights are answered here and never reach authentication or the
//! upstream. Disallowed origins get `ORIGIN_NOT_ALLOWED`.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::context_of;
use crate::error::GatewayError;
use crate::http::server::AppState;

pub async fn cors(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if !state.inner.config.cors.enabled {
        return next.run(req).await;
    }
    let Some(origin) = req.headers().get(header::ORIGIN).cloned() else {
        return next.run(req).await;
    };

    let policy = &state.inner.cors;
    let allowed = origin.to_str().map(|o| policy.origin_allowed(o)).unwrap_or(false);
    if !allowed {
        let ctx = context_of(&req);
        tracing::warn!(origin = ?origin, "Origin not allowed");
        return ctx.error(&GatewayError::OriginNotAllowed);
    }

    let preflight = req.method() == Method::OPTIONS
        && req.headers().contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);
    if preflight {
        let mut response = StatusCode::NO_CONTENT.into_response();
        policy.apply_preflight(&origin, response.headers_mut());
        return response;
    }

    let mut response = next.run(req).await;
    policy.apply_simple(&origin, response.headers_mut());
    response
}
