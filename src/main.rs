//! Edge gateway
//!
//! A reverse proxy that sits in front of a single origin and enforces
//! admission control, shared-secret authentication with brute-force blocking,
//! per-client rate limiting and header hygiene.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                     EDGE GATEWAY                     │
//!   Client         │  ┌────────┐   ┌────────────────────────────────────┐ │
//!   ───────────────┼─▶│  net   │──▶│ http::pipeline                     │ │
//!                  │  │ (TLS)  │   │  validate → auth → rate limit      │ │
//!                  │  └────────┘   └──────────────────┬─────────────────┘ │
//!                  │                                  ▼                   │
//!   ◀──────────────┼────────────────────────── forward::engine ─────────┼──▶ Origin
//!                  │                                                      │
//!                  │  config · observability · lifecycle · janitor        │
//!                  └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use edge_gateway::config::loader::load_effective;
use edge_gateway::config::{GatewayConfig, TrustTier};
use edge_gateway::lifecycle::{signals, Shutdown};
use edge_gateway::net::tls::load_tls_config;
use edge_gateway::observability::{logging, metrics};
use edge_gateway::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "edge-gateway", version, about = "Reverse-proxy edge gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_effective(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("edge-gateway: {}", e);
            return Err(e.into());
        }
    };

    logging::init(&config.observability);
    tracing::info!("edge-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        origin = %config.origin.target_url,
        tls = config.listener.tls.is_some(),
        rate_limit = config.rate_limit.enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );
    warn_on_risky_settings(&config);

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let addr: SocketAddr = config.listener.bind_address.parse()?;
    let tls = match &config.listener.tls {
        Some(tls) => Some(load_tls_config(tls).await?),
        None => None,
    };

    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    let serving = async move {
        match tls {
            Some(tls) => server.run_tls(addr, tls, server_shutdown).await,
            None => {
                let listener = TcpListener::bind(addr).await?;
                server.run(listener, server_shutdown).await
            }
        }
    };
    let mut serving = tokio::spawn(serving);

    tokio::select! {
        result = &mut serving => {
            // The server stopped without being asked to, e.g. a bind failure.
            result??;
        }
        _ = signals::wait_for_signal() => {
            tracing::info!("Shutdown signal received, draining connections");
            shutdown.trigger();
            serving.await??;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn warn_on_risky_settings(config: &GatewayConfig) {
    if config.listener.bind_address.starts_with("0.0.0.0")
        || config.listener.bind_address.starts_with("[::]")
    {
        tracing::warn!(
            bind_address = %config.listener.bind_address,
            "Listening on all interfaces"
        );
    }
    if config.origin.trust_tier == TrustTier::Insecure {
        tracing::warn!("Origin certificates will not be verified");
    }
    if !config.auth.enabled() {
        tracing::warn!("No auth token configured, authentication is disabled");
    }
}
