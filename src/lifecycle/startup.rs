//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order
//! - Start background tasks (key refresh, janitor, health pollers)
//! - Bind the listener and begin accepting traffic
//! - Wire OS signals to graceful shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener binds last, so traffic arrives only when ready

use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::http::{BuildError, HttpServer};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to build gateway: {0}")]
    Build(#[from] BuildError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Run the gateway until SIGINT/SIGTERM, then drain and return.
pub async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());
    run_until(config, shutdown).await
}

/// Run the gateway until `shutdown` fires.
pub async fn run_until(config: GatewayConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let metrics = if config.observability.metrics_enabled {
        metrics::init_metrics()
    } else {
        None
    };

    let address = config.listener.bind_address.clone();
    tracing::info!(
        gateway = %config.gateway.name,
        version = %config.gateway.version,
        bind_address = %address,
        auth_enabled = config.auth.enabled,
        jwks = config.auth.jwks_url.is_some(),
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    let server = HttpServer::new(config, metrics)?;

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address: address.clone(), source })?;

    server.run(listener, shutdown).await.map_err(StartupError::Serve)?;

    tracing::info!("Shutdown complete");
    Ok(())
}
