//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → service resolved → breaker admitted
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through instances)
//!         - least_conn.rs (pick instance with fewest in-flight requests)
//!     → backend.rs (in-flight guard held for the call)
//! ```
//!
//! # Design Decisions
//! - Algorithm selection per service
//! - Instance health is not consulted; the service breaker gates traffic
//! - Selection is lock-free (atomics only)

pub mod backend;
pub mod least_conn;
pub mod round_robin;

use std::sync::Arc;

pub use backend::{InFlightGuard, Instance, InstanceError};
pub use least_conn::LeastConnections;
pub use round_robin::RoundRobin;

use crate::config::LoadBalancerKind;

/// Chooses one instance out of a service's instances.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    fn next_instance(&self, instances: &[Arc<Instance>]) -> Option<Arc<Instance>>;
}

/// Build the balancer for a configured algorithm.
pub fn from_kind(kind: LoadBalancerKind) -> Box<dyn LoadBalancer> {
    match kind {
        LoadBalancerKind::RoundRobin => Box::new(RoundRobin::new()),
        LoadBalancerKind::LeastConnections => Box::new(LeastConnections::new()),
    }
}
