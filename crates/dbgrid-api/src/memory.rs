//! Fully in-process collaborators for local runs and tests.

use std::sync::Arc;

use dbgrid_core::{Endpoint, ProviderConfig};
use dbgrid_gateway::{MemoryDriver, StaticResolver};
use dbgrid_scale::MemoryOrchestrator;
use dbgrid_tunables::MemoryLeaderClient;

use crate::Collaborators;

/// A store cluster, leader peer and orchestrator living in memory.
///
/// The leader is registered on loopback at the flavor's port and accepts
/// the configured admin login.
#[derive(Debug, Clone)]
pub struct InMemoryCluster {
    pub resolver: StaticResolver,
    pub driver: MemoryDriver,
    pub peer: MemoryLeaderClient,
    pub orchestrator: MemoryOrchestrator,
}

impl InMemoryCluster {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            resolver: StaticResolver::with_leader(
                &config.service_name,
                Endpoint::new("127.0.0.1", config.leader_port()),
            ),
            driver: MemoryDriver::new(&config.admin_user, &config.admin_password),
            peer: MemoryLeaderClient::default(),
            orchestrator: MemoryOrchestrator::new(),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            resolver: Arc::new(self.resolver.clone()),
            driver: Arc::new(self.driver.clone()),
            leader_client: Arc::new(self.peer.clone()),
            orchestrator: Arc::new(self.orchestrator.clone()),
        }
    }
}
