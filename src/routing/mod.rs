//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → router.rs (longest-prefix route lookup)
//!     → registry.rs (route.service → ServiceEndpoint)
//!     → Return: endpoint with breaker, balancer, timeout, headers
//!
//! Route Compilation (at startup):
//!     RouteConfig[]  → sort by prefix length → immutable RouteTable
//!     ServiceConfig[] → ServiceRegistry
//!
//! Pattern tables (matcher.rs) back the public-path allow list,
//! rate-limit tiers and exemptions.
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod registry;
pub mod router;

pub use matcher::{PathPattern, PatternTable};
pub use registry::{RegistryError, ServiceEndpoint, ServiceRegistry};
pub use router::{Route, RouteTable};
