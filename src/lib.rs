//! Edge API gateway library.
//!
//! A single entry point in front of a set of HTTP microservices: request
//! pipeline (correlation, CORS, validation, IP filtering, JWT auth, rate
//! limiting), prefix routing, per-service circuit breakers and load
//! balancing, health aggregation and Prometheus metrics.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod routing;

// Identity and policy
pub mod auth;
pub mod security;

// Traffic management
pub mod health;
pub mod load_balancer;
pub mod resilience;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
