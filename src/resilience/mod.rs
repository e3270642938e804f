//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream service:
//!     → circuit_breaker.rs (admit, or reject while the service is failing)
//!     → timeouts.rs (enforce the service's end-to-end deadline)
//!     → outcome reported back to circuit_breaker.rs
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - No automatic retries: a failed call is reported, never replayed
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{BreakerOpen, BreakerPermit, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use timeouts::{with_deadline, DeadlineExceeded};
