//! Per-request context.
//!
//! # Responsibilities
//! - Carry correlation ID, client address and identity through the pipeline
//! - Resolve the client address from forwarding headers or the socket
//! - Render error envelopes bound to this request
//!
//! # Design Decisions
//! - Created once by the outermost stage and stored in request extensions
//! - Stages enrich it; nothing outside the pipeline mutates it
//! - Claims are set only by the authentication stage

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Method, Request};
use axum::response::Response;

use crate::auth::Claims;
use crate::error::GatewayError;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_CORRELATION_ID: &str = "x-correlation-id";

const MAX_CORRELATION_ID_LEN: usize = 128;

/// State shared by every stage of one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    /// `None` when neither headers nor the socket yield an address.
    pub client_ip: Option<IpAddr>,
    /// Address of the socket peer, whatever the headers claim.
    pub peer_ip: Option<IpAddr>,
    pub method: Method,
    pub path: String,
    pub claims: Option<Claims>,
    pub started_at: Instant,
}

impl RequestContext {
    /// Build the context for an inbound request.
    pub fn from_request<B>(req: &Request<B>, trust_forwarded: bool) -> Self {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Self {
            correlation_id: inbound_correlation_id(req.headers()).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            client_ip: client_ip(req.headers(), peer, trust_forwarded),
            peer_ip: peer,
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            claims: None,
            started_at: Instant::now(),
        }
    }

    pub fn error(&self, err: &GatewayError) -> Response {
        err.to_response(&self.correlation_id, &self.path)
    }

    /// Rate-limit identity: the authenticated subject, else the client address.
    pub fn identity(&self) -> String {
        match (&self.claims, self.client_ip) {
            (Some(claims), _) => format!("user:{}", claims.subject),
            (None, Some(ip)) => format!("ip:{ip}"),
            (None, None) => "anonymous".to_string(),
        }
    }
}

/// A caller-supplied ID, if present and printable.
fn inbound_correlation_id(headers: &HeaderMap) -> Option<String> {
    [X_REQUEST_ID, X_CORRELATION_ID]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .find(|v| !v.is_empty() && v.len() <= MAX_CORRELATION_ID_LEN && v.bytes().all(|b| b.is_ascii_graphic()))
        .map(str::to_string)
}

/// First `X-Forwarded-For` entry, then `X-Real-IP`, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_forwarded: bool) -> Option<IpAddr> {
    if trust_forwarded {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if forwarded.is_some() {
            return forwarded;
        }

        let real = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if real.is_some() {
            return real;
        }
    }
    peer
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_client_ip_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "10.0.0.2".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(ip("127.0.0.1")), true), Some(ip("10.0.0.2")));

        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(ip("127.0.0.1")), true), Some(ip("203.0.113.9")));

        assert_eq!(client_ip(&headers, Some(ip("127.0.0.1")), false), Some(ip("127.0.0.1")));
    }

    #[test]
    fn test_garbage_forwarded_for_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "not-an-ip".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(ip("::1")), true), Some(ip("::1")));
        assert_eq!(client_ip(&headers, None, true), None);
    }

    #[test]
    fn test_correlation_id_reused_or_generated() {
        let req = Request::builder()
            .uri("/api/v1/forms")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let ctx = RequestContext::from_request(&req, true);
        assert_eq!(ctx.correlation_id, "abc-123");
        assert_eq!(ctx.path, "/api/v1/forms");

        let req = Request::builder()
            .uri("/")
            .header("x-correlation-id", "has space")
            .body(Body::empty())
            .unwrap();
        let ctx = RequestContext::from_request(&req, true);
        assert!(uuid::Uuid::parse_str(&ctx.correlation_id).is_ok());
    }

    #[test]
    fn test_identity_prefers_subject() {
        let req = Request::builder()
            .uri("/")
            .header("x-real-ip", "10.9.9.9")
            .body(Body::empty())
            .unwrap();
        let mut ctx = RequestContext::from_request(&req, true);
        assert_eq!(ctx.identity(), "ip:10.9.9.9");

        ctx.claims = Claims::from_raw(crate::auth::claims::RawClaims {
            sub: Some("u-7".into()),
            ..Default::default()
        });
        assert_eq!(ctx.identity(), "user:u-7");
    }
}
