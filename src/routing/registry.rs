//! Service registry.
//!
//! # Responsibilities
//! - Map logical service names to their endpoints
//! - Own each service's circuit breaker and load balancer state
//! - Precompute static upstream headers
//!
//! # Design Decisions
//! - Built once from configuration and shared read-only via `Arc`
//! - Identity (name, instances, timeout) is immutable; only breaker and
//!   balancer counters change at runtime

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::{HealthCheckConfig, ServiceConfig};
use crate::load_balancer::{self, Instance, InstanceError, LoadBalancer};
use crate::resilience::CircuitBreaker;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("service '{service}': {source}")]
    Instance {
        service: String,
        #[source]
        source: InstanceError,
    },

    #[error("service '{service}': invalid static header '{name}'")]
    Header { service: String, name: String },

    #[error("service '{0}' has no instances")]
    NoInstances(String),
}

/// One logical upstream service.
#[derive(Debug)]
pub struct ServiceEndpoint {
    pub name: String,
    pub instances: Vec<Arc<Instance>>,
    pub health_path: String,
    pub timeout: Duration,
    /// Injected into every upstream request.
    pub headers: HeaderMap,
    pub breaker: Arc<CircuitBreaker>,
    pub health_check: HealthCheckConfig,
    balancer: Box<dyn LoadBalancer>,
}

impl ServiceEndpoint {
    pub fn from_config(config: &ServiceConfig, default_health: &HealthCheckConfig) -> Result<Self, RegistryError> {
        if config.urls.is_empty() {
            return Err(RegistryError::NoInstances(config.name.clone()));
        }

        let instances = config
            .urls
            .iter()
            .map(|raw| Instance::parse(raw).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| RegistryError::Instance {
                service: config.name.clone(),
                source,
            })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header_error = || RegistryError::Header {
                service: config.name.clone(),
                name: name.clone(),
            };
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| header_error())?;
            let value = HeaderValue::from_str(value).map_err(|_| header_error())?;
            headers.insert(name, value);
        }

        Ok(Self {
            name: config.name.clone(),
            instances,
            health_path: config.health_path.clone(),
            timeout: config.timeout(),
            headers,
            breaker: Arc::new(CircuitBreaker::new(&config.name, &config.circuit_breaker)),
            health_check: config.health_check.clone().unwrap_or_else(|| default_health.clone()),
            balancer: load_balancer::from_kind(config.load_balancer),
        })
    }

    /// Pick the instance for the next call.
    pub fn select_instance(&self) -> Option<Arc<Instance>> {
        self.balancer.next_instance(&self.instances)
    }
}

/// All configured services by name.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<ServiceEndpoint>>,
}

impl ServiceRegistry {
    pub fn from_config(configs: &[ServiceConfig], default_health: &HealthCheckConfig) -> Result<Self, RegistryError> {
        let mut services = HashMap::with_capacity(configs.len());
        for config in configs {
            let endpoint = ServiceEndpoint::from_config(config, default_health)?;
            tracing::debug!(
                service = %endpoint.name,
                instances = endpoint.instances.len(),
                timeout_ms = endpoint.timeout.as_millis() as u64,
                "Service registered"
            );
            services.insert(endpoint.name.clone(), Arc::new(endpoint));
        }
        Ok(Self { services })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ServiceEndpoint>> {
        self.services.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ServiceEndpoint>> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
