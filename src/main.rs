//! Edge API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                     EDGE GATEWAY                     │
//!                         │                                                      │
//!   Client Request        │  correlation → recovery → access log → security hdrs │
//!   ──────────────────────┼─▶ → cors → validation → ip filter → auth             │
//!                         │  → rate limit → transform                            │
//!                         │            │                                         │
//!                         │            ▼                                         │
//!                         │  route table → service registry → circuit breaker    │
//!                         │            │                                         │
//!                         │            ▼                                         │
//!   Client Response       │  load balancer → upstream call (deadline) ───────────┼──▶ Services
//!   ◀─────────────────────┼── response transform ◀─────────────────────────────── │
//!                         │                                                      │
//!                         │  background: JWKS refresh · rate janitor · pollers   │
//!                         └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use edge_gateway::config::{self, ConfigError, GatewayConfig};
use edge_gateway::lifecycle;
use edge_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "edge-gateway")]
#[command(about = "API gateway for HTTP microservices", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults plus environment when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

fn load(cli: &Cli) -> Result<GatewayConfig, ConfigError> {
    match &cli.config {
        Some(path) => config::load_config(path),
        None => config::load_default(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("edge-gateway: {err}");
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        println!(
            "configuration ok: {} routes, {} services",
            config.routes.len(),
            config.services.len()
        );
        return ExitCode::SUCCESS;
    }

    if let Err(err) = logging::init_logging(&config.observability) {
        eprintln!("edge-gateway: {err}");
        return ExitCode::FAILURE;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");

    match lifecycle::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Gateway terminated");
            ExitCode::FAILURE
        }
    }
}
