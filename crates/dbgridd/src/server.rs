//! Process wiring and the API server loop.

use std::net::SocketAddr;
use std::sync::Arc;

use dbgrid_api::{ApiState, Collaborators, InMemoryCluster};
use dbgrid_core::{Flavor, ProviderConfig};
use dbgrid_gateway::{DnsResolver, SqlxDriver};
use dbgrid_scale::HttpOrchestrator;
use dbgrid_tunables::HttpLeaderClient;
use tracing::{info, warn};

/// Collaborators that talk to the real cluster.
fn cluster_collaborators(config: &ProviderConfig) -> Collaborators {
    Collaborators {
        resolver: Arc::new(DnsResolver::new(config.leader_port())),
        driver: Arc::new(SqlxDriver::new(config.flavor.into())),
        leader_client: Arc::new(HttpLeaderClient::new()),
        orchestrator: Arc::new(HttpOrchestrator::new(&config.controller_addr)),
    }
}

pub async fn run(flavor: Flavor, port: Option<u16>, in_memory: bool) -> anyhow::Result<()> {
    let mut config = ProviderConfig::from_env(flavor)?;
    if let Some(port) = port {
        config.port = port;
    }
    let config = Arc::new(config);
    info!(?config, in_memory, "dbgrid provider starting");

    if config.app_id.is_empty() && !in_memory {
        warn!("FLYNN_APP_ID is not set; scale-up and scale checks will fail");
    }

    // ── Initialize subsystems ──────────────────────────────────

    let collaborators = if in_memory {
        InMemoryCluster::new(&config).collaborators()
    } else {
        cluster_collaborators(&config)
    };
    let state = ApiState::new(Arc::clone(&config), collaborators);

    // ── Start API server ───────────────────────────────────────

    let router = dbgrid_api::build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, service = %config.service_name, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("dbgrid provider stopped");
    Ok(())
}
