//! Active health checking.
//!
//! # Responsibilities
//! - Run one poller per service, each on its own interval and timeout
//! - Probe every instance's health path
//! - Publish results to the health registry and metrics
//!
//! # Design Decisions
//! - A service is healthy when at least one instance answers 2xx
//! - Results feed `/health` only; routing never consults them

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Request, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::health::state::{HealthRegistry, HealthStatus, ServiceHealth};
use crate::lifecycle::Shutdown;
use crate::load_balancer::Instance;
use crate::observability::metrics;
use crate::routing::{ServiceEndpoint, ServiceRegistry};

pub struct HealthMonitor {
    services: Arc<ServiceRegistry>,
    health: Arc<HealthRegistry>,
    client: Client<HttpConnector, Body>,
}

impl HealthMonitor {
    pub fn new(services: Arc<ServiceRegistry>, health: Arc<HealthRegistry>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        for service in services.iter().filter(|s| s.health_check.enabled) {
            health.register(&service.name);
        }

        Self {
            services,
            health,
            client,
        }
    }

    /// Spawn one poller per service with health checks enabled.
    pub fn spawn(self, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        self.services
            .iter()
            .filter(|service| service.health_check.enabled)
            .map(|service| {
                let poller = Poller {
                    service: Arc::clone(service),
                    health: Arc::clone(&self.health),
                    client: self.client.clone(),
                };
                tokio::spawn(poller.run(shutdown.subscribe()))
            })
            .collect()
    }
}

struct Poller {
    service: Arc<ServiceEndpoint>,
    health: Arc<HealthRegistry>,
    client: Client<HttpConnector, Body>,
}

impl Poller {
    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let interval = Duration::from_secs(self.service.health_check.interval_secs);
        tracing::info!(
            service = %self.service.name,
            interval_secs = interval.as_secs(),
            path = %self.service.health_path,
            "Health poller starting"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let result = self.check().await;
                    metrics::record_service_health(&self.service.name, result.status == HealthStatus::Healthy);
                    self.health.record(&self.service.name, result);
                }
                _ = shutdown.recv() => {
                    tracing::debug!(service = %self.service.name, "Health poller stopping");
                    break;
                }
            }
        }
    }

    async fn check(&self) -> ServiceHealth {
        let timeout = Duration::from_secs(self.service.health_check.timeout_secs);
        let mut best: Option<u64> = None;
        let mut last_error = String::from("no instances");
        let mut slowest_failure = None;

        for instance in &self.service.instances {
            match self.probe(instance, timeout).await {
                Ok(elapsed_ms) => best = Some(best.map_or(elapsed_ms, |b| b.min(elapsed_ms))),
                Err((elapsed_ms, error)) => {
                    tracing::warn!(
                        service = %self.service.name,
                        instance = %instance.authority,
                        error = %error,
                        "Health check failed"
                    );
                    slowest_failure = Some(elapsed_ms);
                    last_error = error;
                }
            }
        }

        match best {
            Some(ms) => ServiceHealth::healthy(ms),
            None => ServiceHealth::unhealthy(slowest_failure, last_error),
        }
    }

    async fn probe(&self, instance: &Instance, timeout: Duration) -> Result<u64, (u64, String)> {
        let uri = format!(
            "http://{}{}{}",
            instance.authority, instance.base_path, self.service.health_path
        );
        let uri: Uri = uri.parse().map_err(|e: axum::http::uri::InvalidUri| (0, e.to_string()))?;

        let request = Request::get(uri)
            .header(header::USER_AGENT, "edge-gateway-health-check")
            .body(Body::empty())
            .map_err(|e| (0, e.to_string()))?;

        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, self.client.request(request)).await;
        let elapsed = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(response)) if response.status().is_success() => Ok(elapsed),
            Ok(Ok(response)) => Err((elapsed, format!("status {}", response.status().as_u16()))),
            Ok(Err(e)) => Err((elapsed, format!("connection error: {e}"))),
            Err(_) => Err((elapsed, format!("timeout after {}ms", timeout.as_millis()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HealthCheckConfig, ServiceConfig};
    use axum::routing::get;

    async fn serve(status: u16) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().route(
            "/health",
            get(move || async move { axum::http::StatusCode::from_u16(status).unwrap() }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn registry(urls: Vec<String>) -> Arc<ServiceRegistry> {
        let mut config = ServiceConfig::new("svc", urls[0].clone());
        config.urls = urls;
        config.health_check = Some(HealthCheckConfig {
            enabled: true,
            interval_secs: 60,
            timeout_secs: 1,
        });
        Arc::new(ServiceRegistry::from_config(&[config], &HealthCheckConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn test_poller_records_healthy_service() {
        let services = registry(vec![serve(200).await]);
        let health = Arc::new(HealthRegistry::new());
        let shutdown = Shutdown::new();

        let handles = HealthMonitor::new(services, health.clone()).spawn(&shutdown);
        assert_eq!(handles.len(), 1);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(health.get("svc").unwrap().status, HealthStatus::Healthy);
        shutdown.trigger();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_failing_instances_mark_unhealthy() {
        let services = registry(vec![serve(500).await, "http://127.0.0.1:1".to_string()]);
        let health = Arc::new(HealthRegistry::new());
        let shutdown = Shutdown::new();

        let _handles = HealthMonitor::new(services, health.clone()).spawn(&shutdown);
        tokio::time::sleep(Duration::from_millis(300)).await;

        let state = health.get("svc").unwrap();
        assert_eq!(state.status, HealthStatus::Unhealthy);
        assert!(state.error.is_some());
        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_one_healthy_instance_is_enough() {
        let services = registry(vec!["http://127.0.0.1:1".to_string(), serve(204).await]);
        let health = Arc::new(HealthRegistry::new());
        let shutdown = Shutdown::new();

        let _handles = HealthMonitor::new(services, health.clone()).spawn(&shutdown);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(health.get("svc").unwrap().status, HealthStatus::Healthy);
        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_disabled_service_is_not_tracked() {
        let mut config = ServiceConfig::new("quiet", "http://127.0.0.1:1");
        config.health_check = Some(HealthCheckConfig {
            enabled: false,
            ..HealthCheckConfig::default()
        });
        let services = Arc::new(ServiceRegistry::from_config(&[config], &HealthCheckConfig::default()).unwrap());
        let health = Arc::new(HealthRegistry::new());

        let _monitor = HealthMonitor::new(services, health.clone());
        assert!(health.get("quiet").is_none());
        assert!(health.report().per_service.is_empty());
    }
}
