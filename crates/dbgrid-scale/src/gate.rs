//! One-shot scale-up gate shared by every provisioning request.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dbgrid_core::{Deadline, ProviderResult};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::orchestrator::{Orchestrator, ScaleRequest};

/// Two states, `NOT_SCALED` and `SCALED`; starts `NOT_SCALED`.
///
/// The lock covers the whole check-and-call, so concurrent callers queue
/// behind an in-flight scale-up instead of issuing their own. A failed
/// scale-up leaves the gate closed and the next caller tries again.
pub struct ScaleGate {
    orchestrator: Arc<dyn Orchestrator>,
    lock: Mutex<()>,
    scaled: AtomicBool,
}

impl ScaleGate {
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self {
            orchestrator,
            lock: Mutex::new(()),
            scaled: AtomicBool::new(false),
        }
    }

    /// Whether a scale-up has succeeded in this process.
    pub fn is_scaled(&self) -> bool {
        self.scaled.load(Ordering::Acquire)
    }

    /// Scale the cluster up unless this process already has.
    ///
    /// Waiting for the lock and the orchestrator call both count against
    /// `deadline`.
    pub async fn ensure_scaled(&self, request: &ScaleRequest, deadline: &Deadline) -> ProviderResult<()> {
        if self.is_scaled() {
            return Ok(());
        }
        let _guard = deadline
            .run("wait for scale gate", async { Ok(self.lock.lock().await) })
            .await?;
        if self.is_scaled() {
            return Ok(());
        }

        info!(cluster = %request.cluster, singleton = request.singleton, "scaling cluster up");
        match deadline
            .run("scale up", self.orchestrator.scale_up(request))
            .await
        {
            Ok(()) => {
                self.scaled.store(true, Ordering::Release);
                info!(cluster = %request.cluster, "cluster scaled");
                Ok(())
            }
            Err(err) => {
                error!(cluster = %request.cluster, error = %err, "scale-up failed");
                Err(err)
            }
        }
    }
}
