//! Request pipeline.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → correlation      (context, correlation ID)
//!     → recovery         (panic → 500 envelope)
//!     → access_log       (log line, request metrics)
//!     → security_headers (response hardening)
//!     → cors             (preflight, origin check)
//!     → validation       (URI, header and body limits)
//!     → ip_filter        (allow/block lists)
//!     → auth             (bearer token → claims)
//!     → rate_limit       (per identity and tier)
//!     → transform        (identity and forwarding headers)
//!     → proxy handler
//! ```
//!
//! # Design Decisions
//! - The order lives in one constant, `PIPELINE`; nothing else decides it
//! - A stage that rejects returns its envelope directly and later stages
//!   never run; outer stages still see and decorate the rejection
//! - Stages share one `RequestContext` through request extensions

pub mod access_log;
pub mod auth;
pub mod correlation;
pub mod cors;
pub mod guards;
pub mod rate_limit;
pub mod transform;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::Router;

use crate::http::context::RequestContext;
use crate::http::server::AppState;

/// One pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Correlation,
    Recovery,
    AccessLog,
    SecurityHeaders,
    Cors,
    Validation,
    IpFilter,
    Authentication,
    RateLimit,
    Transform,
}

/// Stages in execution order, outermost first.
pub const PIPELINE: [Stage; 10] = [
    Stage::Correlation,
    Stage::Recovery,
    Stage::AccessLog,
    Stage::SecurityHeaders,
    Stage::Cors,
    Stage::Validation,
    Stage::IpFilter,
    Stage::Authentication,
    Stage::RateLimit,
    Stage::Transform,
];

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Correlation => "correlation",
            Stage::Recovery => "recovery",
            Stage::AccessLog => "access_log",
            Stage::SecurityHeaders => "security_headers",
            Stage::Cors => "cors",
            Stage::Validation => "validation",
            Stage::IpFilter => "ip_filter",
            Stage::Authentication => "auth",
            Stage::RateLimit => "rate_limit",
            Stage::Transform => "transform",
        }
    }

    fn wrap(self, router: Router, state: &AppState) -> Router {
        let state = state.clone();
        match self {
            Stage::Correlation => router.layer(from_fn_with_state(state, correlation::correlation)),
            Stage::Recovery => router.layer(from_fn(correlation::recovery)),
            Stage::AccessLog => router.layer(from_fn(access_log::access_log)),
            Stage::SecurityHeaders => router.layer(from_fn_with_state(state, guards::security_headers)),
            Stage::Cors => router.layer(from_fn_with_state(state, cors::cors)),
            Stage::Validation => router.layer(from_fn_with_state(state, guards::validation)),
            Stage::IpFilter => router.layer(from_fn_with_state(state, guards::ip_filter)),
            Stage::Authentication => router.layer(from_fn_with_state(state, auth::authenticate)),
            Stage::RateLimit => router.layer(from_fn_with_state(state, rate_limit::rate_limit)),
            Stage::Transform => router.layer(from_fn_with_state(state, transform::transform)),
        }
    }
}

/// Wrap `router` in every stage of `PIPELINE`.
///
/// Each `layer` call becomes the new outermost layer, so stages are added
/// innermost first.
pub fn apply(router: Router, state: &AppState) -> Router {
    PIPELINE
        .iter()
        .rev()
        .fold(router, |router, stage| stage.wrap(router, state))
}

/// The request's context, or a fresh one when the pipeline was bypassed.
pub(crate) fn context_of(req: &Request<Body>) -> RequestContext {
    req.extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(|| RequestContext::from_request(req, false))
}
