//! Header manipulation and security headers.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Strip client-supplied identity headers at the trust boundary
//! - Add security response headers
//!
//! # Design Decisions
//! - Headers listed in `Connection` are hop-by-hop too
//! - Identity headers (`X-User-*`) are only ever written by the gateway

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::config::SecurityHeadersConfig;

/// Headers that describe a single transport hop.
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Prefix of headers carrying gateway-asserted identity.
pub const IDENTITY_PREFIX: &str = "x-user-";

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// Remove every `X-User-*` header a client sent.
pub fn strip_identity_headers(headers: &mut HeaderMap) {
    let spoofed: Vec<HeaderName> = headers
        .keys()
        .filter(|name| name.as_str().starts_with(IDENTITY_PREFIX))
        .cloned()
        .collect();
    for name in spoofed {
        headers.remove(&name);
    }
}

/// Precomputed security response headers.
#[derive(Debug, Clone, Default)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    pub fn from_config(config: &SecurityHeadersConfig) -> Self {
        let mut headers = vec![
            (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
            (HeaderName::from_static("x-xss-protection"), HeaderValue::from_static("1; mode=block")),
        ];

        let configured = [
            (header::CONTENT_SECURITY_POLICY, &config.content_security_policy),
            (header::X_FRAME_OPTIONS, &config.frame_options),
            (header::REFERRER_POLICY, &config.referrer_policy),
        ];
        for (name, value) in configured {
            if value.is_empty() {
                continue;
            }
            match HeaderValue::from_str(value) {
                Ok(v) => headers.push((name, v)),
                Err(_) => tracing::warn!(header = %name, "Ignoring unrepresentable security header value"),
            }
        }

        if config.hsts_max_age_secs > 0 {
            let hsts = format!("max-age={}; includeSubDomains", config.hsts_max_age_secs);
            if let Ok(v) = HeaderValue::from_str(&hsts) {
                headers.push((header::STRICT_TRANSPORT_SECURITY, v));
            }
        }

        Self { headers }
    }

    /// Set each header unless the upstream already chose a value.
    pub fn apply(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            if !target.contains_key(name) {
                target.insert(name.clone(), value.clone());
            }
        }
    }
}
