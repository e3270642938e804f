//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or built-in defaults
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (GATEWAY_* environment overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → consumed once at startup to build the gateway state
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_default, ConfigError};
pub use schema::{
    AuthConfig, CircuitBreakerConfig, CorsConfig, EndpointLimitConfig, GatewayConfig,
    GatewayInfoConfig, HealthCheckConfig, IpFilterConfig, ListenerConfig, LoadBalancerKind,
    ObservabilityConfig, RateLimitConfig, RouteConfig, SecurityHeadersConfig, ServiceConfig,
    ValidationConfig,
};
