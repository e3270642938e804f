//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing services)
//! - Validate value ranges (thresholds, windows and timeouts > 0)
//! - Check URL, path pattern and address syntax
//! - Upstream instances are plain HTTP; TLS ends before the gateway
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use url::Url;

use crate::config::schema::GatewayConfig;
use crate::security::access_control::IpNet;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending setting.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    validate_services(config, &mut errors);
    validate_routes(config, &mut errors);
    validate_auth(config, &mut errors);
    validate_rate_limit(config, &mut errors);

    for (list, entries) in [("ip_filter.allow", &config.ip_filter.allow), ("ip_filter.block", &config.ip_filter.block)] {
        for entry in entries {
            if entry.parse::<IpNet>().is_err() {
                errors.push(ValidationError::new(list, format!("'{entry}' is not an address or CIDR block")));
            }
        }
    }

    if config.health_check.interval_secs == 0 || config.health_check.timeout_secs == 0 {
        errors.push(ValidationError::new("health_check", "interval and timeout must be > 0"));
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}', expected pretty or json", config.observability.log_format),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_services(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();

    for service in &config.services {
        let field = format!("services.{}", service.name);

        if service.name.is_empty() {
            errors.push(ValidationError::new("services", "service name must not be empty"));
        }
        if !seen.insert(service.name.as_str()) {
            errors.push(ValidationError::new(&field, "duplicate service name"));
        }
        if service.urls.is_empty() {
            errors.push(ValidationError::new(&field, "at least one url is required"));
        }
        for raw in &service.urls {
            match Url::parse(raw) {
                Ok(url) if url.scheme() == "http" && url.host().is_some() => {}
                _ => errors.push(ValidationError::new(
                    format!("{field}.urls"),
                    format!("'{raw}' is not an absolute http url"),
                )),
            }
        }
        if !service.health_path.starts_with('/') {
            errors.push(ValidationError::new(format!("{field}.health_path"), "must start with '/'"));
        }
        if service.timeout_ms == 0 {
            errors.push(ValidationError::new(format!("{field}.timeout_ms"), "must be > 0"));
        }

        let breaker = &service.circuit_breaker;
        if breaker.failure_threshold == 0 || breaker.test_request_volume == 0 || breaker.recovery_timeout_secs == 0 {
            errors.push(ValidationError::new(
                format!("{field}.circuit_breaker"),
                "failure_threshold, recovery_timeout_secs and test_request_volume must be > 0",
            ));
        }

        if let Some(health) = &service.health_check {
            if health.interval_secs == 0 || health.timeout_secs == 0 {
                errors.push(ValidationError::new(
                    format!("{field}.health_check"),
                    "interval and timeout must be > 0",
                ));
            }
        }
    }
}

fn validate_routes(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    let services: HashSet<&str> = config.services.iter().map(|s| s.name.as_str()).collect();
    let mut prefixes = HashSet::new();

    for route in &config.routes {
        let field = format!("routes.{}", route.prefix);

        if !route.prefix.starts_with('/') {
            errors.push(ValidationError::new(&field, "prefix must start with '/'"));
        }
        if !prefixes.insert(route.prefix.trim_end_matches('/')) {
            errors.push(ValidationError::new(&field, "duplicate route prefix"));
        }
        if !services.contains(route.service.as_str()) {
            errors.push(ValidationError::new(
                &field,
                format!("references unknown service '{}'", route.service),
            ));
        }
        if let Some(strip) = &route.strip_prefix {
            if !route.prefix.starts_with(strip.as_str()) {
                errors.push(ValidationError::new(
                    format!("{field}.strip_prefix"),
                    "must be a prefix of the route prefix",
                ));
            }
        }
    }
}

fn validate_auth(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    let auth = &config.auth;

    if let Some(url) = &auth.jwks_url {
        if Url::parse(url).is_err() {
            errors.push(ValidationError::new("auth.jwks_url", format!("'{url}' is not a valid url")));
        }
    }
    if auth.enabled && auth.jwt_secret.is_none() && auth.jwks_url.is_none() {
        errors.push(ValidationError::new(
            "auth",
            "enabled authentication needs jwt_secret or jwks_url",
        ));
    }
    if auth.jwks_refresh_interval_secs == 0 || auth.jwks_fetch_timeout_secs == 0 {
        errors.push(ValidationError::new("auth", "jwks intervals must be > 0"));
    }
    for path in &auth.public_paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::new("auth.public_paths", format!("'{path}' must start with '/'")));
        }
    }
}

fn validate_rate_limit(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    let rl = &config.rate_limit;

    if rl.requests == 0 || rl.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit", "requests and window_secs must be > 0"));
    }
    if rl.cleanup_interval_secs == 0 {
        errors.push(ValidationError::new("rate_limit.cleanup_interval_secs", "must be > 0"));
    }
    for endpoint in &rl.endpoints {
        if !endpoint.pattern.starts_with('/') {
            errors.push(ValidationError::new(
                "rate_limit.endpoints",
                format!("pattern '{}' must start with '/'", endpoint.pattern),
            ));
        }
        if endpoint.requests == 0 || endpoint.window_secs == 0 {
            errors.push(ValidationError::new(
                "rate_limit.endpoints",
                format!("pattern '{}' needs requests and window_secs > 0", endpoint.pattern),
            ));
        }
    }
    for path in &rl.exempt_paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::new("rate_limit.exempt_paths", format!("'{path}' must start with '/'")));
        }
    }
}
