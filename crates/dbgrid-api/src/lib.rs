//! dbgrid-api — HTTP/JSON surface of the database provider.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/provider/provision` | Create a tenant principal and schema |
//! | POST | `/provider/deprovision` | Drop a tenant by resource id |
//! | GET | `/provider/tunables` | Read the cluster tunables |
//! | PUT | `/provider/tunables` | Version-checked tunables write |
//! | GET | `/status` | Health, 200 or 503 |
//!
//! Every body is wrapped in `{success, data?, error?, kind?}`. Handlers
//! honour an `x-request-timeout-ms` header as the request deadline.

pub mod error;
pub mod handlers;
pub mod memory;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use dbgrid_core::SharedConfig;
use dbgrid_gateway::{Driver, Resolver, StoreGateway};
use dbgrid_health::HealthReporter;
use dbgrid_provision::ProvisionEngine;
use dbgrid_scale::{Orchestrator, ScaleGate};
use dbgrid_tunables::{LeaderClient, TunablesService};

pub use error::ApiError;
pub use memory::InMemoryCluster;

/// External systems the provider talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn Resolver>,
    pub driver: Arc<dyn Driver>,
    pub leader_client: Arc<dyn LeaderClient>,
    pub orchestrator: Arc<dyn Orchestrator>,
}

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub config: SharedConfig,
    pub engine: ProvisionEngine,
    pub tunables: TunablesService,
    pub health: HealthReporter,
}

impl ApiState {
    /// Wire the provider components. The scale gate created here is the
    /// only one in the process.
    pub fn new(config: SharedConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            resolver,
            driver,
            leader_client,
            orchestrator,
        } = collaborators;

        let gateway = StoreGateway::from_config(&config, Arc::clone(&resolver), driver);
        let gate = Arc::new(ScaleGate::new(Arc::clone(&orchestrator)));
        let tunables = TunablesService::from_config(&config, resolver, leader_client);
        let health = HealthReporter::new(
            Arc::clone(&config),
            tunables.clone(),
            orchestrator,
            gateway.clone(),
        );
        let engine = ProvisionEngine::new(Arc::clone(&config), gate, gateway);

        Self {
            config,
            engine,
            tunables,
            health,
        }
    }
}

/// Build the provider router.
pub fn build_router(state: ApiState) -> Router {
    let provider_routes = Router::new()
        .route("/provision", post(handlers::provision))
        .route("/deprovision", post(handlers::deprovision))
        .route(
            "/tunables",
            get(handlers::get_tunables).put(handlers::update_tunables),
        );

    Router::new()
        .nest("/provider", provider_routes)
        .route("/status", get(handlers::status))
        .with_state(state)
}
