//! Gateway error taxonomy and the JSON error envelope.
//!
//! # Responsibilities
//! - Enumerate every terminal failure a request can end with
//! - Map each failure to a stable machine code and HTTP status
//! - Render the `{"error":{code,message,correlationId,path}}` body
//!
//! # Design Decisions
//! - Component errors (`AuthError`, `UpstreamError`, ...) stay in their own
//!   modules and are converted here at the HTTP boundary
//! - `Internal` never carries detail; the cause is logged where it happens

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use serde::Serialize;

/// A terminal, client-visible gateway failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Malformed request input.
    #[error("{0}")]
    Validation(String),

    #[error("authorization token is required")]
    MissingToken,

    /// Bad signature, expired, unknown key, bad claims: all look the same.
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("{0}")]
    Forbidden(String),

    #[error("client address is not allowed")]
    IpNotAllowed,

    #[error("origin is not allowed")]
    OriginNotAllowed,

    #[error("no route matches the request path")]
    RouteNotFound,

    #[error("service '{0}' is not registered")]
    ServiceNotFound(String),

    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("service '{0}' is temporarily unavailable")]
    CircuitOpen(String),

    /// Connect or protocol failure talking to the upstream.
    #[error("upstream service '{0}' is unavailable")]
    UpstreamUnavailable(String),

    /// The per-service deadline elapsed.
    #[error("upstream service '{0}' did not respond in time")]
    UpstreamTimeout(String),

    /// The service has no instance to forward to.
    #[error("no instance of service '{0}' is available")]
    ServiceUnavailable(String),

    #[error("internal server error")]
    Internal,
}

impl GatewayError {
    /// Stable machine-readable code placed in the envelope.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "VALIDATION_ERROR",
            GatewayError::MissingToken => "MISSING_TOKEN",
            GatewayError::InvalidToken => "INVALID_TOKEN",
            GatewayError::Forbidden(_) => "FORBIDDEN",
            GatewayError::IpNotAllowed => "IP_NOT_ALLOWED",
            GatewayError::OriginNotAllowed => "ORIGIN_NOT_ALLOWED",
            GatewayError::RouteNotFound => "ROUTE_NOT_FOUND",
            GatewayError::ServiceNotFound(_) => "SERVICE_NOT_FOUND",
            GatewayError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::CircuitOpen(_) => "CIRCUIT_BREAKER_OPEN",
            GatewayError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            GatewayError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            GatewayError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            GatewayError::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::MissingToken | GatewayError::InvalidToken => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_)
            | GatewayError::IpNotAllowed
            | GatewayError::OriginNotAllowed => StatusCode::FORBIDDEN,
            GatewayError::RouteNotFound | GatewayError::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::CircuitOpen(_)
            | GatewayError::UpstreamTimeout(_)
            | GatewayError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render the error envelope for a request.
    pub fn to_response(&self, correlation_id: &str, path: &str) -> Response {
        let envelope = ErrorEnvelope {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
                correlation_id,
                path,
            },
        };

        // Serializing a struct of strings cannot fail.
        let body = serde_json::to_vec(&envelope).unwrap_or_default();

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = self.status();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let GatewayError::RateLimited { retry_after_secs } = self {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
        }

        response
    }
}

/// Wire shape of an error response.
#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    code: &'static str,
    message: String,
    correlation_id: &'a str,
    path: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::MissingToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(GatewayError::IpNotAllowed.status(), StatusCode::FORBIDDEN);
        assert_eq!(GatewayError::CircuitOpen("a".into()).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(GatewayError::UpstreamUnavailable("a".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(GatewayError::UpstreamTimeout("a".into()).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(GatewayError::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        let response = GatewayError::RateLimited { retry_after_secs: 7 }.to_response("abc", "/api/x");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(json["error"]["correlationId"], "abc");
        assert_eq!(json["error"]["path"], "/api/x");
    }
}
