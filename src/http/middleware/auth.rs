//! Bearer token authentication.
//!
//! # Responsibilities
//! - Skip public paths and disabled auth
//! - Extract `Authorization: Bearer <token>`
//! - Validate and attach claims to the request context
//!
//! # Design Decisions
//! - Every validation failure surfaces as `INVALID_TOKEN`; the precise
//!   reason goes to logs and the failure counter only
//! - Role and permission checks need the resolved route, so they run in
//!   the proxy handler, not here

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;

use super::context_of;
use crate::error::GatewayError;
use crate::http::context::RequestContext;
use crate::http::server::AppState;
use crate::observability::metrics;

pub async fn authenticate(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let inner = &state.inner;
    if !inner.config.auth.enabled || inner.public_paths.is_match(req.uri().path()) {
        return next.run(req).await;
    }

    let mut ctx = context_of(&req);
    let Some(token) = bearer_token(req.headers()).map(str::to_owned) else {
        metrics::record_auth_failure("missing_token");
        tracing::debug!("Request without bearer token");
        return ctx.error(&GatewayError::MissingToken);
    };

    match inner.validator.validate(&token).await {
        Ok(claims) => {
            tracing::debug!(subject = %claims.subject, "Token accepted");
            ctx.claims = Some(claims);
            req.extensions_mut().insert::<RequestContext>(ctx);
            next.run(req).await
        }
        Err(err) => {
            metrics::record_auth_failure(err.reason());
            tracing::warn!(reason = err.reason(), error = %err, "Token rejected");
            ctx.error(&GatewayError::InvalidToken)
        }
    }
}

/// The token of a `Bearer` authorization header, scheme matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
