//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{backend::Instance, LoadBalancer};

/// Round-robin selector.
/// Stores an internal counter to rotate through instances.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_instance(&self, instances: &[Arc<Instance>]) -> Option<Arc<Instance>> {
        if instances.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % instances.len();
        Some(instances[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let a = Arc::new(Instance::parse("http://127.0.0.1:8080").unwrap());
        let b = Arc::new(Instance::parse("http://127.0.0.1:8081").unwrap());
        let instances = vec![a.clone(), b.clone()];

        let picks: Vec<String> = (0..3)
            .map(|_| lb.next_instance(&instances).unwrap().authority.to_string())
            .collect();
        assert_eq!(picks, vec!["127.0.0.1:8080", "127.0.0.1:8081", "127.0.0.1:8080"]);
        assert!(lb.next_instance(&[]).is_none());
    }
}
