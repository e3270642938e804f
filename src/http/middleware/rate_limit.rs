//! Rate limiting stage.

use std::time::SystemTime;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;

use super::context_of;
use crate::error::GatewayError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::RateDecision;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

pub async fn rate_limit(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if !state.inner.config.rate_limit.enabled {
        return next.run(req).await;
    }

    let ctx = context_of(&req);
    let identity = ctx.identity();
    let Some(decision) = state.inner.rate_limiter.check(&identity, &ctx.path) else {
        return next.run(req).await;
    };

    if !decision.allowed {
        metrics::record_rate_limited(&decision.tier);
        tracing::warn!(identity = %identity, tier = %decision.tier, limit = decision.limit, "Rate limit exceeded");
        let mut response = ctx.error(&GatewayError::RateLimited {
            retry_after_secs: decision.retry_after_secs(),
        });
        set_headers(&decision, response.headers_mut());
        return response;
    }

    let mut response = next.run(req).await;
    set_headers(&decision, response.headers_mut());
    response
}

fn set_headers(decision: &RateDecision, headers: &mut HeaderMap) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_epoch_secs(SystemTime::now())));
}
