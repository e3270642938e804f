//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Gateway identification headers.
    pub gateway: GatewayInfoConfig,

    /// Token validation and key management.
    pub auth: AuthConfig,

    /// Sliding-window rate limiting.
    pub rate_limit: RateLimitConfig,

    pub cors: CorsConfig,

    /// Standard security response headers.
    pub security: SecurityHeadersConfig,

    /// Request parameter limits.
    pub validation: ValidationConfig,

    pub ip_filter: IpFilterConfig,

    /// Default health-check schedule, overridable per service.
    pub health_check: HealthCheckConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Path prefix to service table.
    pub routes: Vec<RouteConfig>,

    /// Upstream service definitions.
    pub services: Vec<ServiceConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Seconds to wait for in-flight requests on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            shutdown_grace_secs: 30,
        }
    }
}

/// Values placed in gateway identification headers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayInfoConfig {
    /// Sent as `X-Gateway` on responses and `X-Gateway-Source` upstream.
    pub name: String,
    pub version: String,
}

impl Default for GatewayInfoConfig {
    fn default() -> Self {
        Self {
            name: "edge-gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Token validation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When false every request is treated as anonymous.
    pub enabled: bool,

    /// Shared secret for HS256/384/512 tokens.
    pub jwt_secret: Option<String>,

    /// JWKS endpoint for RSA tokens.
    pub jwks_url: Option<String>,

    /// Required `iss` claim.
    pub issuer: String,

    /// Required `aud` membership.
    pub audience: String,

    /// Background key-set refresh cadence.
    pub jwks_refresh_interval_secs: u64,

    /// Upper bound on a single key-set fetch.
    pub jwks_fetch_timeout_secs: u64,

    /// Tolerance applied to `exp` and `nbf`.
    pub leeway_secs: u64,

    /// How far in the future `iat` may be before the token is rejected.
    pub iat_skew_secs: u64,

    /// Paths that bypass authentication. A trailing `*` makes a prefix match.
    pub public_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jwt_secret: None,
            jwks_url: None,
            issuer: "x-form-api-gateway".to_string(),
            audience: "x-form-services".to_string(),
            jwks_refresh_interval_secs: 300,
            jwks_fetch_timeout_secs: 5,
            leeway_secs: 0,
            iat_skew_secs: 300,
            public_paths: vec![
                "/health".to_string(),
                "/metrics".to_string(),
                "/api/v1/auth/login".to_string(),
                "/api/v1/auth/signup".to_string(),
                "/api/v1/auth/refresh".to_string(),
                "/public/*".to_string(),
            ],
        }
    }
}

impl AuthConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.jwks_refresh_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.jwks_fetch_timeout_secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Global limit: admissions per window per identity.
    pub requests: u32,

    /// Global window length.
    pub window_secs: u64,

    /// Endpoint-specific tiers. They take priority over the global limit.
    pub endpoints: Vec<EndpointLimitConfig>,

    /// Paths never subject to limiting (exact or trailing `*`).
    pub exempt_paths: Vec<String>,

    /// Janitor cadence for dropping idle identity windows.
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: 100,
            window_secs: 60,
            endpoints: Vec::new(),
            exempt_paths: vec!["/health".to_string(), "/metrics".to_string()],
            cleanup_interval_secs: 60,
        }
    }
}

/// A rate-limit tier bound to a path pattern.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointLimitConfig {
    /// Exact path, or a prefix followed by `*`.
    pub pattern: String,
    pub requests: u32,
    pub window_secs: u64,
}

/// CORS policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,

    /// Allowed origins; `*` allows any.
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: [
                "Authorization",
                "Content-Type",
                "X-Request-ID",
                "X-Correlation-ID",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
            exposed_headers: [
                "X-Correlation-ID",
                "X-RateLimit-Limit",
                "X-RateLimit-Remaining",
                "X-RateLimit-Reset",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
            allow_credentials: false,
            max_age_secs: 86_400,
        }
    }
}

/// Security response headers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityHeadersConfig {
    pub enabled: bool,
    pub content_security_policy: String,
    pub frame_options: String,
    pub referrer_policy: String,
    /// `Strict-Transport-Security` max-age; 0 disables the header.
    pub hsts_max_age_secs: u64,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            content_security_policy: "default-src 'self'".to_string(),
            frame_options: "DENY".to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
            hsts_max_age_secs: 31_536_000,
        }
    }
}

/// Request parameter validation limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub enabled: bool,
    pub max_uri_length: usize,
    pub max_header_count: usize,
    /// Largest accepted declared `Content-Length`.
    pub max_body_bytes: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_uri_length: 8_192,
            max_header_count: 100,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Client address allow/block lists.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IpFilterConfig {
    pub enabled: bool,

    /// Single addresses or CIDR blocks. Empty means "allow all not blocked".
    pub allow: Vec<String>,

    /// Single addresses or CIDR blocks. Block wins over allow.
    pub block: Vec<String>,

    /// Resolve the client from `X-Forwarded-For` / `X-Real-IP`.
    pub trust_forwarded_headers: bool,
}

impl Default for IpFilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allow: Vec::new(),
            block: Vec::new(),
            trust_forwarded_headers: true,
        }
    }
}

/// Health check schedule.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable background health polling.
    pub enabled: bool,

    /// Interval between checks in seconds.
    pub interval_secs: u64,

    /// Timeout for each check in seconds.
    pub timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// `pretty` or `json`.
    pub log_format: String,

    /// Serve `GET /metrics`.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
        }
    }
}

/// Route configuration mapping a path prefix to a service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path prefix to match (segment aware).
    pub prefix: String,

    /// Service name to forward to.
    pub service: String,

    /// Removed from the path before forwarding.
    #[serde(default)]
    pub strip_prefix: Option<String>,

    /// Caller needs at least one of these roles.
    #[serde(default)]
    pub required_roles: Vec<String>,

    /// Caller needs all of these permissions.
    #[serde(default)]
    pub required_permissions: Vec<String>,
}

impl RouteConfig {
    pub fn new(prefix: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            service: service.into(),
            strip_prefix: None,
            required_roles: Vec::new(),
            required_permissions: Vec::new(),
        }
    }
}

/// Load balancing algorithm across a service's instances.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerKind {
    #[default]
    RoundRobin,
    LeastConnections,
}

/// Upstream service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Unique logical service name.
    pub name: String,

    /// One or more instance base URLs.
    pub urls: Vec<String>,

    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// End-to-end deadline for a proxied call.
    #[serde(default = "default_service_timeout_ms")]
    pub timeout_ms: u64,

    /// Static headers injected into every upstream request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub load_balancer: LoadBalancerKind,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Overrides the global health-check schedule.
    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_service_timeout_ms() -> u64 {
    30_000
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            urls: vec![url.into()],
            health_path: default_health_path(),
            timeout_ms: default_service_timeout_ms(),
            headers: BTreeMap::new(),
            load_balancer: LoadBalancerKind::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            health_check: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Per-service breaker thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,

    /// Time since the last failure before a trial is allowed.
    pub recovery_timeout_secs: u64,

    /// Half-open trials admitted, and consecutive successes needed to close.
    pub test_request_volume: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            test_request_volume: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [[services]]
            name = "auth-service"
            urls = ["http://auth-service:3001"]

            [[routes]]
            prefix = "/api/v1/auth"
            service = "auth-service"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.services[0].timeout_ms, 30_000);
        assert_eq!(config.services[0].circuit_breaker.failure_threshold, 5);
        assert_eq!(config.services[0].load_balancer, LoadBalancerKind::RoundRobin);
        assert_eq!(config.routes[0].service, "auth-service");
        assert!(config.auth.enabled);
    }

    #[test]
    fn test_load_balancer_kind_names() {
        let service: ServiceConfig = toml::from_str(
            r#"
            name = "forms"
            urls = ["http://a:1", "http://b:2"]
            load_balancer = "least_connections"
            "#,
        )
        .unwrap();
        assert_eq!(service.load_balancer, LoadBalancerKind::LeastConnections);
    }
}
