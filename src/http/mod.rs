//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs      (Axum setup, connect info, graceful drain)
//!     → middleware/    (ordered pipeline, one RequestContext per request)
//!     → endpoints.rs   (/health, /metrics)
//!     → proxy.rs       (route → service → breaker → instance → upstream)
//!     → upgrade.rs     (101 responses become raw byte tunnels)
//!     → Send to client
//! ```

pub mod context;
pub mod endpoints;
pub mod middleware;
pub mod proxy;
pub mod server;
pub mod upgrade;

pub use context::RequestContext;
pub use middleware::{Stage, PIPELINE};
pub use server::{build_router, AppState, BuildError, GatewayState, HttpServer};
