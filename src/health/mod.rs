//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     One timer per service (own interval, own timeout)
//!     → Probe each instance's health path
//!     → Update state.rs
//!
//! Reporting (state.rs):
//!     GET /health → aggregate report over all services
//! ```
//!
//! # Design Decisions
//! - Health is reported, not enforced: per-request gating belongs to the
//!   circuit breaker
//! - Pollers never touch hot-path locks

pub mod active;
pub mod state;

pub use active::HealthMonitor;
pub use state::{HealthRegistry, HealthReport, HealthStatus, OverallStatus, ServiceHealth};
