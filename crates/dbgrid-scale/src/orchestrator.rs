//! Scale orchestrator client.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use dbgrid_core::http::JsonRequest;
use dbgrid_core::{ProviderConfig, ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Boxed future returned by [`Orchestrator`] calls.
pub type OrchestratorFuture<'a, T> = Pin<Box<dyn Future<Output = ProviderResult<T>> + Send + 'a>>;

/// Everything the orchestrator needs to grow a cluster to its target size.
#[derive(Clone, PartialEq, Eq)]
pub struct ScaleRequest {
    pub app_id: String,
    /// Logical cluster (service) name.
    pub cluster: String,
    /// Store type the orchestrator sizes (`postgres`, `mariadb`),
    /// independent of the service name.
    pub provider: String,
    /// Address the scaled cluster's leader is expected on.
    pub target: String,
    pub auth_token: String,
    /// Single-node topology. Passed through unchanged.
    pub singleton: bool,
}

impl ScaleRequest {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            app_id: config.app_id.clone(),
            cluster: config.service_name.clone(),
            provider: config.flavor.default_service().to_string(),
            target: format!("{}:{}", config.leader_host(), config.leader_port()),
            auth_token: config.controller_key.clone(),
            singleton: config.singleton,
        }
    }
}

impl fmt::Debug for ScaleRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScaleRequest")
            .field("app_id", &self.app_id)
            .field("cluster", &self.cluster)
            .field("provider", &self.provider)
            .field("target", &self.target)
            .field("auth_token", &"<redacted>")
            .field("singleton", &self.singleton)
            .finish()
    }
}

/// External service that sizes store clusters.
pub trait Orchestrator: Send + Sync {
    /// Grow the cluster and return once it is serving.
    fn scale_up<'a>(&'a self, request: &'a ScaleRequest) -> OrchestratorFuture<'a, ()>;

    /// Whether the cluster behind `provider` has ever been scaled up.
    fn check_scaled<'a>(
        &'a self,
        app_id: &'a str,
        auth_token: &'a str,
        provider: &'a str,
    ) -> OrchestratorFuture<'a, bool>;
}

#[derive(Debug, Serialize)]
struct ScaleUpBody<'a> {
    target: &'a str,
    provider: &'a str,
    singleton: bool,
}

#[derive(Debug, Deserialize)]
struct ScaleStatusBody {
    scaled: bool,
}

/// [`Orchestrator`] backed by the controller's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpOrchestrator {
    addr: String,
}

impl HttpOrchestrator {
    /// Client for the controller at `addr` (`host:port`).
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
        }
    }
}

// An unset app id is a deployment fault, not a caller error.
fn require_app(app_id: &str) -> ProviderResult<()> {
    if app_id.is_empty() {
        return Err(ProviderError::Internal(
            "FLYNN_APP_ID is not configured".to_string(),
        ));
    }
    Ok(())
}

impl Orchestrator for HttpOrchestrator {
    fn scale_up<'a>(&'a self, request: &'a ScaleRequest) -> OrchestratorFuture<'a, ()> {
        Box::pin(async move {
            require_app(&request.app_id)?;
            let path = format!("/apps/{}/scale-up", urlencoding::encode(&request.app_id));
            let body = ScaleUpBody {
                target: &request.target,
                provider: &request.provider,
                singleton: request.singleton,
            };
            JsonRequest::post(&self.addr, &path)
                .bearer(&request.auth_token)
                .json(&body)?
                .send()
                .await?
                .error_for_status()?;
            debug!(cluster = %request.cluster, "orchestrator scale-up returned");
            Ok(())
        })
    }

    fn check_scaled<'a>(
        &'a self,
        app_id: &'a str,
        auth_token: &'a str,
        provider: &'a str,
    ) -> OrchestratorFuture<'a, bool> {
        Box::pin(async move {
            require_app(app_id)?;
            let path = format!(
                "/apps/{}/scale-status?provider={}",
                urlencoding::encode(app_id),
                urlencoding::encode(provider)
            );
            let status: ScaleStatusBody = JsonRequest::get(&self.addr, &path)
                .bearer(auth_token)
                .send()
                .await?
                .error_for_status()?
                .json()?;
            Ok(status.scaled)
        })
    }
}
