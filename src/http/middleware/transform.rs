//! Request transformation.
//!
//! # Responsibilities
//! - Drop client-supplied identity headers
//! - Inject identity headers from validated claims
//! - Add correlation and forwarding headers
//!
//! # Design Decisions
//! - Identity headers are stripped unconditionally, authenticated or not,
//!   so upstreams can trust any `X-User-*` they receive
//! - `X-Forwarded-For` accumulates: the socket peer is appended to the chain

use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;

use super::context_of;
use crate::auth::Claims;
use crate::http::context::{X_CORRELATION_ID, X_REQUEST_ID};
use crate::http::server::AppState;
use crate::security::headers::strip_identity_headers;

pub const X_USER_ID: &str = "x-user-id";
pub const X_USER_EMAIL: &str = "x-user-email";
pub const X_USER_ROLES: &str = "x-user-roles";
pub const X_USER_PERMISSIONS: &str = "x-user-permissions";
pub const X_USER_SESSION: &str = "x-user-session-id";
pub const X_GATEWAY_SOURCE: &str = "x-gateway-source";
pub const X_GATEWAY_TIMESTAMP: &str = "x-gateway-timestamp";

pub async fn transform(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let ctx = context_of(&req);
    let headers = req.headers_mut();

    strip_identity_headers(headers);
    if let Some(claims) = &ctx.claims {
        inject_identity(claims, headers);
    }

    if let Ok(id) = HeaderValue::from_str(&ctx.correlation_id) {
        headers.insert(X_CORRELATION_ID, id.clone());
        headers.insert(X_REQUEST_ID, id);
    }

    forwarding(headers, ctx.client_ip, ctx.peer_ip);

    if let Ok(source) = HeaderValue::from_str(&state.inner.config.gateway.name) {
        headers.insert(X_GATEWAY_SOURCE, source);
    }
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    headers.insert(X_GATEWAY_TIMESTAMP, HeaderValue::from(now_ms));

    next.run(req).await
}

fn inject_identity(claims: &Claims, headers: &mut HeaderMap) {
    let mut set = |name: &'static str, value: &str| {
        if value.is_empty() {
            return;
        }
        match HeaderValue::from_str(value) {
            Ok(v) => {
                headers.insert(HeaderName::from_static(name), v);
            }
            Err(_) => tracing::warn!(header = name, "Claim is not a valid header value, not forwarded"),
        }
    };

    set(X_USER_ID, &claims.subject);
    if let Some(email) = &claims.email {
        set(X_USER_EMAIL, email);
    }
    set(X_USER_ROLES, &claims.roles.join(","));
    set(X_USER_PERMISSIONS, &claims.permissions.join(","));
    if let Some(session) = &claims.session_id {
        set(X_USER_SESSION, session);
    }
}

fn forwarding(headers: &mut HeaderMap, client: Option<IpAddr>, peer: Option<IpAddr>) {
    if let Some(peer) = peer {
        let chain = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.trim().is_empty() => format!("{}, {peer}", existing.trim()),
            _ => peer.to_string(),
        };
        if let Ok(v) = HeaderValue::from_str(&chain) {
            headers.insert("x-forwarded-for", v);
        }
    }

    if let Some(client) = client {
        if let Ok(v) = HeaderValue::from_str(&client.to_string()) {
            headers.insert("x-real-ip", v);
        }
    }

    if !headers.contains_key("x-forwarded-host") {
        if let Some(host) = headers.get(header::HOST).cloned() {
            headers.insert("x-forwarded-host", host);
        }
    }
    if !headers.contains_key("x-forwarded-proto") {
        headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
    }
}
