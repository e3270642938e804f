//! HTTP server setup and shared gateway state.
//!
//! # Responsibilities
//! - Build every runtime component from a validated configuration
//! - Create the Axum router: gateway endpoints, proxy fallback, pipeline
//! - Own background tasks (key refresh, rate-window janitor, health pollers)
//! - Serve connections and drain them on shutdown within the grace period

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::routing::get;
use axum::Router;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::auth::{HttpKeySource, KeyCache, KeyRefreshTask, KeySource, TokenValidator};
use crate::config::GatewayConfig;
use crate::health::{HealthMonitor, HealthRegistry};
use crate::http::{endpoints, middleware, proxy};
use crate::lifecycle::Shutdown;
use crate::routing::{PatternTable, RegistryError, RouteTable, ServiceRegistry};
use crate::security::access_control::IpNetParseError;
use crate::security::{CorsPolicy, IpFilter, RateLimiter, RequestLimits, SecurityHeaders};

/// Failure assembling the gateway from configuration.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("ip_filter: {0}")]
    IpFilter(#[from] IpNetParseError),
}

/// Everything request handling reads. Built once, shared behind `Arc`.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub routes: RouteTable,
    pub services: Arc<ServiceRegistry>,
    pub keys: Arc<KeyCache>,
    pub validator: TokenValidator,
    pub public_paths: PatternTable<()>,
    pub rate_limiter: Arc<RateLimiter>,
    pub ip_filter: IpFilter,
    pub cors: CorsPolicy,
    pub security_headers: SecurityHeaders,
    pub limits: RequestLimits,
    pub health: Arc<HealthRegistry>,
    pub metrics: Option<PrometheusHandle>,
    pub client: Client<HttpConnector, Body>,
}

impl GatewayState {
    /// Build state, fetching signing keys from `auth.jwks_url` when set.
    pub fn from_config(config: GatewayConfig, metrics: Option<PrometheusHandle>) -> Result<Self, BuildError> {
        let source = config
            .auth
            .jwks_url
            .as_ref()
            .map(|url| Arc::new(HttpKeySource::new(url.clone())) as Arc<dyn KeySource>);
        Self::with_key_source(config, source, metrics)
    }

    /// Build state with an explicit signing-key source.
    pub fn with_key_source(
        config: GatewayConfig,
        source: Option<Arc<dyn KeySource>>,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self, BuildError> {
        let services = Arc::new(ServiceRegistry::from_config(&config.services, &config.health_check)?);
        let keys = Arc::new(KeyCache::new(source, config.auth.fetch_timeout()));
        let validator = TokenValidator::new(&config.auth, Arc::clone(&keys));

        // Only polled services appear in the health report.
        let health = Arc::new(HealthRegistry::new());
        for service in services.iter().filter(|s| s.health_check.enabled) {
            health.register(&service.name);
        }

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            routes: RouteTable::from_config(&config.routes),
            services,
            validator,
            keys,
            public_paths: PatternTable::from_patterns(&config.auth.public_paths),
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            ip_filter: IpFilter::from_config(&config.ip_filter)?,
            cors: CorsPolicy::from_config(&config.cors),
            security_headers: SecurityHeaders::from_config(&config.security),
            limits: RequestLimits::from_config(&config.validation),
            health,
            metrics,
            client,
            config,
        })
    }
}

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<GatewayState>,
}

impl AppState {
    pub fn new(state: GatewayState) -> Self {
        Self { inner: Arc::new(state) }
    }
}

/// Gateway endpoints, proxy fallback and the full request pipeline.
pub fn build_router(state: &AppState) -> Router {
    let mut router = Router::new()
        .route(endpoints::HEALTH_PATH, get(endpoints::health))
        .route(endpoints::METRICS_PATH, get(endpoints::metrics))
        .fallback(proxy::proxy_handler)
        .with_state(state.clone());

    let validation = &state.inner.config.validation;
    if validation.enabled {
        // Declared lengths are checked in the pipeline; this bounds streamed bodies.
        let limit = usize::try_from(validation.max_body_bytes).unwrap_or(usize::MAX);
        router = router.layer(RequestBodyLimitLayer::new(limit));
    }

    middleware::apply(router, state)
}

/// HTTP server for the gateway.
pub struct HttpServer {
    state: AppState,
    router: Router,
}

impl HttpServer {
    pub fn new(config: GatewayConfig, metrics: Option<PrometheusHandle>) -> Result<Self, BuildError> {
        Ok(Self::from_state(GatewayState::from_config(config, metrics)?))
    }

    pub fn from_state(state: GatewayState) -> Self {
        let state = AppState::new(state);
        let router = build_router(&state);
        Self { state, router }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires, then drain.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let inner = Arc::clone(&self.state.inner);
        let config = &inner.config;

        tracing::info!(
            address = %addr,
            routes = inner.routes.len(),
            services = inner.services.len(),
            "HTTP server starting"
        );

        let key_refresh = inner.keys.has_source().then(|| {
            KeyRefreshTask::start(Arc::clone(&inner.keys), config.auth.refresh_interval(), shutdown.subscribe())
        });

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        if config.rate_limit.enabled {
            tasks.push(Arc::clone(&inner.rate_limiter).spawn_janitor(
                Duration::from_secs(config.rate_limit.cleanup_interval_secs),
                shutdown.subscribe(),
            ));
        }
        let monitor = HealthMonitor::new(Arc::clone(&inner.services), Arc::clone(&inner.health));
        tasks.extend(monitor.spawn(&shutdown));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let drain_signal = shutdown.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { drain_signal.wait().await })
                .await
        });

        let grace = Duration::from_secs(config.listener.shutdown_grace_secs);
        let result = tokio::select! {
            joined = &mut server => joined.map_err(std::io::Error::other).and_then(|served| served),
            _ = async {
                shutdown.wait().await;
                tracing::info!(grace_secs = grace.as_secs(), "Draining connections");
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!("Grace period elapsed, closing remaining connections");
                server.abort();
                Ok(())
            }
        };

        shutdown.trigger();
        if let Some(task) = key_refresh {
            task.stop().await;
        }
        for task in tasks {
            let _ = task.await;
        }

        tracing::info!("HTTP server stopped");
        result
    }
}
