//! Upstream forwarding.
//!
//! # Responsibilities
//! - Resolve route → service → instance for each request
//! - Enforce per-route role and permission requirements
//! - Gate calls through the service's circuit breaker
//! - Rewrite the URI and headers for the upstream
//! - Apply the per-service deadline and classify the outcome
//!
//! # Data Flow
//! ```text
//! request (after pipeline)
//!     → RouteTable::lookup        (404 ROUTE_NOT_FOUND)
//!     → authorize                 (403 FORBIDDEN)
//!     → ServiceRegistry::get      (404 SERVICE_NOT_FOUND)
//!     → CircuitBreaker::try_acquire (503 CIRCUIT_BREAKER_OPEN)
//!     → select_instance           (503 SERVICE_UNAVAILABLE)
//!     → with_deadline(client.request)
//!         ok     → stream response back, settle permit
//!         error  → 502 UPSTREAM_UNAVAILABLE
//!         timeout→ 503 UPSTREAM_TIMEOUT
//! ```
//!
//! # Design Decisions
//! - No retries: a failed call is reported to the breaker once
//! - Upstream 5xx responses are passed through but count as failures
//! - Response bodies stream; the deadline covers the response head
//! - Client disconnect drops the in-flight future, which cancels the
//!   upstream call and releases the instance guard

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, StatusCode, Uri, Version};
use axum::response::Response;

use crate::auth::Claims;
use crate::error::GatewayError;
use crate::http::context::RequestContext;
use crate::http::middleware::context_of;
use crate::http::server::AppState;
use crate::http::upgrade;
use crate::load_balancer::Instance;
use crate::observability::metrics;
use crate::resilience::with_deadline;
use crate::routing::{Route, ServiceEndpoint};
use crate::security::headers::strip_hop_by_hop;

pub const X_SERVED_BY: &str = "x-served-by";
pub const X_GATEWAY: &str = "x-gateway";

/// A failed upstream call.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("request to '{service}' failed: {source}")]
    Request {
        service: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("'{service}' did not respond within {deadline:?}")]
    Timeout { service: String, deadline: Duration },
}

impl UpstreamError {
    /// `outcome` label for the upstream metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            UpstreamError::Request { .. } => "error",
            UpstreamError::Timeout { .. } => "timeout",
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Request { service, .. } => GatewayError::UpstreamUnavailable(service),
            UpstreamError::Timeout { service, .. } => GatewayError::UpstreamTimeout(service),
        }
    }
}

/// Response extension naming the service that produced the response.
#[derive(Debug, Clone)]
pub struct ServedBy(pub String);

/// Fallback handler: everything that is not a gateway endpoint is proxied.
pub async fn proxy_handler(State(state): State<AppState>, req: Request<Body>) -> Response {
    let ctx = context_of(&req);
    match forward(&state, &ctx, req).await {
        Ok(response) => response,
        Err(err) => ctx.error(&err),
    }
}

async fn forward(state: &AppState, ctx: &RequestContext, mut req: Request<Body>) -> Result<Response, GatewayError> {
    let inner = &state.inner;

    let route = inner.routes.lookup(&ctx.path).ok_or(GatewayError::RouteNotFound)?;
    authorize(route, ctx.claims.as_ref())?;

    let service = inner
        .services
        .get(&route.service)
        .ok_or_else(|| GatewayError::ServiceNotFound(route.service.clone()))?;

    let permit = service.breaker.try_acquire().map_err(|_| {
        tracing::debug!(service = %service.name, "Circuit open, failing fast");
        GatewayError::CircuitOpen(service.name.clone())
    })?;

    let instance = service.select_instance().ok_or_else(|| {
        tracing::warn!(service = %service.name, "No instance available");
        GatewayError::ServiceUnavailable(service.name.clone())
    })?;
    let _in_flight = instance.acquire();

    let client_upgrade = upgrade::is_upgrade_request(&req).then(|| hyper::upgrade::on(&mut req));
    let upstream_req = build_upstream_request(req, route, service, &instance, &ctx.path, client_upgrade.is_some())?;

    tracing::debug!(service = %service.name, upstream = %upstream_req.uri(), trial = permit.is_trial(), "Forwarding request");

    let start = Instant::now();
    let outcome = match with_deadline(service.timeout, inner.client.request(upstream_req)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(source)) => Err(UpstreamError::Request {
            service: service.name.clone(),
            source,
        }),
        Err(elapsed) => Err(UpstreamError::Timeout {
            service: service.name.clone(),
            deadline: elapsed.0,
        }),
    };

    let mut response = match outcome {
        Ok(response) => response,
        Err(err) => {
            permit.failure();
            metrics::record_upstream(&service.name, err.outcome(), start);
            tracing::warn!(instance = %instance.url, error = %err, "Upstream call failed");
            return Err(err.into());
        }
    };

    let status = response.status();
    if status.is_server_error() {
        permit.failure();
        metrics::record_upstream(&service.name, "error", start);
        tracing::warn!(service = %service.name, status = status.as_u16(), "Upstream returned server error");
    } else {
        permit.success();
        metrics::record_upstream(&service.name, "success", start);
    }

    let switching = status == StatusCode::SWITCHING_PROTOCOLS;
    if let (true, Some(client)) = (switching, client_upgrade) {
        let upstream = hyper::upgrade::on(&mut response);
        upgrade::spawn_tunnel(client, upstream, service.name.clone());
    }

    Ok(finish_response(response.map(Body::new), &service.name, &inner.config.gateway.name, switching))
}

/// Role (any-of) and permission (all-of) requirements of a route.
fn authorize(route: &Route, claims: Option<&Claims>) -> Result<(), GatewayError> {
    if route.required_roles.is_empty() && route.required_permissions.is_empty() {
        return Ok(());
    }
    let Some(claims) = claims else {
        return Err(GatewayError::Forbidden("authentication is required for this route".into()));
    };
    if !claims.has_any_role(&route.required_roles) {
        return Err(GatewayError::Forbidden("insufficient role".into()));
    }
    if !claims.has_all_permissions(&route.required_permissions) {
        return Err(GatewayError::Forbidden("insufficient permissions".into()));
    }
    Ok(())
}

/// Upstream URI: instance base path + (possibly stripped) request path + query.
pub fn upstream_uri(instance: &Instance, route: &Route, path: &str, query: Option<&str>) -> Result<Uri, GatewayError> {
    let forwarded = route.upstream_path(path);
    let mut path_and_query = String::with_capacity(instance.base_path.len() + forwarded.len() + 1);
    path_and_query.push_str(&instance.base_path);
    path_and_query.push_str(&forwarded);
    if let Some(query) = query {
        path_and_query.push('?');
        path_and_query.push_str(query);
    }

    Uri::builder()
        .scheme(instance.scheme.clone())
        .authority(instance.authority.clone())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| {
            tracing::error!(error = %e, "Could not build upstream URI");
            GatewayError::Internal
        })
}

fn build_upstream_request(
    req: Request<Body>,
    route: &Route,
    service: &ServiceEndpoint,
    instance: &Instance,
    path: &str,
    upgrading: bool,
) -> Result<Request<Body>, GatewayError> {
    let (mut parts, body) = req.into_parts();

    parts.uri = upstream_uri(instance, route, path, parts.uri.query())?;
    parts.version = Version::HTTP_11;

    let upgrade_protocol = parts.headers.get(header::UPGRADE).cloned();
    strip_hop_by_hop(&mut parts.headers);
    if let (true, Some(protocol)) = (upgrading, upgrade_protocol) {
        upgrade::restore_upgrade_headers(&mut parts.headers, protocol);
    }

    if let Ok(host) = HeaderValue::from_str(instance.authority.as_str()) {
        parts.headers.insert(header::HOST, host);
    }
    for (name, value) in &service.headers {
        parts.headers.insert(name.clone(), value.clone());
    }

    Ok(Request::from_parts(parts, body))
}

fn finish_response(mut response: Response, service: &str, gateway: &str, switching: bool) -> Response {
    let headers = response.headers_mut();
    if !switching {
        strip_hop_by_hop(headers);
    }
    if let Ok(v) = HeaderValue::from_str(service) {
        headers.insert(X_SERVED_BY, v);
    }
    if let Ok(v) = HeaderValue::from_str(gateway) {
        headers.insert(X_GATEWAY, v);
    }
    response.extensions_mut().insert(ServedBy(service.to_string()));
    response
}
