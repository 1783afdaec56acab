//! Version-checked tunables reads and writes against the current leader.

use std::collections::BTreeMap;
use std::sync::Arc;

use dbgrid_core::{Deadline, Endpoint, ProviderConfig, ProviderError, ProviderResult, Tunables};
use dbgrid_gateway::Resolver;
use tracing::{debug, info, warn};

use crate::changes::TunableChanges;
use crate::client::{LeaderClient, LeaderStatus};

/// Tunables and status access for one store service.
///
/// The leader is resolved on every call and its peer API is assumed to
/// listen one port above the store port.
#[derive(Clone)]
pub struct TunablesService {
    resolver: Arc<dyn Resolver>,
    client: Arc<dyn LeaderClient>,
    service: String,
    peer_port: u16,
    singleton: bool,
}

impl TunablesService {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        client: Arc<dyn LeaderClient>,
        service: &str,
        peer_port: u16,
        singleton: bool,
    ) -> Self {
        Self {
            resolver,
            client,
            service: service.to_string(),
            peer_port,
            singleton,
        }
    }

    pub fn from_config(
        config: &ProviderConfig,
        resolver: Arc<dyn Resolver>,
        client: Arc<dyn LeaderClient>,
    ) -> Self {
        Self::new(
            resolver,
            client,
            &config.service_name,
            config.peer_port(),
            config.singleton,
        )
    }

    async fn peer(&self, deadline: &Deadline) -> ProviderResult<Endpoint> {
        let leader = deadline
            .run("resolve leader", self.resolver.resolve(&self.service))
            .await?;
        Ok(leader.with_port(self.peer_port))
    }

    /// Self-reported status of the current leader.
    pub async fn status(&self, deadline: &Deadline) -> ProviderResult<LeaderStatus> {
        let peer = self.peer(deadline).await?;
        deadline.run("leader status", self.client.status(&peer)).await
    }

    /// Current tunables. Never cached.
    pub async fn get(&self, deadline: &Deadline) -> ProviderResult<Tunables> {
        let peer = self.peer(deadline).await?;
        deadline.run("get tunables", self.client.get_tunables(&peer)).await
    }

    /// Replace the tunables with `data`, provided the leader is still at
    /// `base_version`. Returns the stored blob (`base_version + 1`).
    ///
    /// Fails with `Forbidden` on singleton clusters without contacting the
    /// leader, and with `Conflict` when `base_version` is stale.
    pub async fn update(
        &self,
        data: BTreeMap<String, String>,
        base_version: u64,
        deadline: &Deadline,
    ) -> ProviderResult<Tunables> {
        if self.singleton {
            return Err(ProviderError::Forbidden(
                "Tunables can't be updated on singleton clusters".to_string(),
            ));
        }
        let version = base_version.checked_add(1).ok_or_else(|| {
            ProviderError::InvalidArgument(format!("version {base_version} cannot be incremented"))
        })?;
        let next = Tunables { data, version };

        let peer = self.peer(deadline).await?;
        deadline
            .run("update tunables", self.client.update_tunables(&peer, &next))
            .await?;
        info!(service = %self.service, version, "tunables updated");
        Ok(next)
    }

    /// Read, apply `changes`, and write back, re-reading on `Conflict`.
    ///
    /// Gives up after `max_attempts` writes (at least one) and returns the
    /// last `Conflict`. Other errors are returned immediately.
    pub async fn update_with_retry(
        &self,
        changes: &TunableChanges,
        max_attempts: u32,
        deadline: &Deadline,
    ) -> ProviderResult<Tunables> {
        let attempts = max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.get(deadline).await?;
            let data = changes.apply(&current.data);
            match self.update(data, current.version, deadline).await {
                Err(ProviderError::Conflict(msg)) if attempt < attempts => {
                    debug!(attempt, %msg, "tunables changed underneath us, retrying");
                }
                Err(err @ ProviderError::Conflict(_)) => {
                    warn!(attempts, "tunables update kept conflicting");
                    return Err(err);
                }
                other => return other,
            }
        }
    }
}
