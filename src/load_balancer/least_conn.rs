//! Least-in-flight load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{backend::Instance, LoadBalancer};

/// Selects the instance with the fewest requests in flight.
/// In case of tie, the first one is selected (stability).
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn next_instance(&self, instances: &[Arc<Instance>]) -> Option<Arc<Instance>> {
        instances.iter().min_by_key(|i| i.in_flight()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_least_conn() {
        let lb = LeastConnections::new();
        let a = Arc::new(Instance::parse("http://127.0.0.1:8080").unwrap());
        let b = Arc::new(Instance::parse("http://127.0.0.1:8081").unwrap());
        let instances = vec![a.clone(), b.clone()];

        let _busy = a.acquire();
        assert_eq!(lb.next_instance(&instances).unwrap().authority, b.authority);

        let _b1 = b.acquire();
        let _b2 = b.acquire();
        assert_eq!(lb.next_instance(&instances).unwrap().authority, a.authority);
    }
}
