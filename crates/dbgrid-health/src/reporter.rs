//! Service health for the `Status` operation.

use std::fmt;
use std::sync::Arc;

use dbgrid_core::{Deadline, ProviderError, ServiceState, SharedConfig, StatusReply};
use dbgrid_gateway::StoreGateway;
use dbgrid_scale::Orchestrator;
use dbgrid_tunables::TunablesService;
use tracing::{debug, warn};

/// Outcome of one health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    /// The cluster has never been scaled up. Reported as healthy.
    NotYetScaled,
    Unhealthy { reason: ProviderError },
}

impl HealthState {
    pub fn is_healthy(&self) -> bool {
        !matches!(self, Self::Unhealthy { .. })
    }

    pub fn service_state(&self) -> ServiceState {
        if self.is_healthy() {
            ServiceState::Healthy
        } else {
            ServiceState::Unhealthy
        }
    }

    pub fn to_reply(&self) -> StatusReply {
        let detail = match self {
            Self::Healthy => None,
            Self::NotYetScaled => Some("not yet scaled".to_string()),
            Self::Unhealthy { reason } => Some(reason.to_string()),
        };
        StatusReply {
            state: self.service_state(),
            detail,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::NotYetScaled => f.write_str("not yet scaled"),
            Self::Unhealthy { reason } => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// Runs the three-step health check.
#[derive(Clone)]
pub struct HealthReporter {
    config: SharedConfig,
    tunables: TunablesService,
    orchestrator: Arc<dyn Orchestrator>,
    gateway: StoreGateway,
}

impl HealthReporter {
    pub fn new(
        config: SharedConfig,
        tunables: TunablesService,
        orchestrator: Arc<dyn Orchestrator>,
        gateway: StoreGateway,
    ) -> Self {
        Self {
            config,
            tunables,
            orchestrator,
            gateway,
        }
    }

    /// 1. A leader reporting read-write skips the scale check.
    /// 2. Otherwise an unscaled cluster is `NotYetScaled`.
    /// 3. A `Ping` on the leader decides between healthy and unhealthy.
    ///
    /// The read-write shortcut trusts the leader even when this process
    /// has never completed a scale-up.
    pub async fn check(&self, deadline: &Deadline) -> HealthState {
        let read_write = match self.tunables.status(deadline).await {
            Ok(status) => status.read_write,
            Err(err) => {
                debug!(error = %err, "leader status unavailable, checking scale");
                false
            }
        };

        if !read_write {
            let scaled = deadline
                .run(
                    "check scaled",
                    self.orchestrator.check_scaled(
                        &self.config.app_id,
                        &self.config.controller_key,
                        self.config.flavor.default_service(),
                    ),
                )
                .await;
            match scaled {
                Ok(true) => {}
                Ok(false) => {
                    debug!(service = %self.config.service_name, "cluster not yet scaled");
                    return HealthState::NotYetScaled;
                }
                Err(err) => {
                    warn!(error = %err, "scale check failed");
                    return HealthState::Unhealthy { reason: err };
                }
            }
        }

        match self.gateway.ping(deadline).await {
            Ok(()) => HealthState::Healthy,
            Err(err) => {
                warn!(error = %err, "leader liveness check failed");
                HealthState::Unhealthy { reason: err }
            }
        }
    }
}
