//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (security response headers)
//!     → cors.rs (origin policy, preflight)
//!     → limits.rs (URI length, header count, body size, path hygiene)
//!     → access_control.rs (client address allow/block lists)
//!     → rate_limit.rs (per-identity sliding windows)
//!     → headers.rs (strip hop-by-hop and spoofed identity headers)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod access_control;
pub mod cors;
pub mod headers;
pub mod limits;
pub mod rate_limit;

pub use access_control::{IpFilter, IpNet};
pub use cors::CorsPolicy;
pub use headers::SecurityHeaders;
pub use limits::{LimitViolation, RequestLimits};
pub use rate_limit::{RateDecision, RateLimiter, RateTier};
