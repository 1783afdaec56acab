//! In-process orchestrator.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dbgrid_core::{ProviderError, ProviderResult};

use crate::orchestrator::{Orchestrator, OrchestratorFuture, ScaleRequest};

#[derive(Debug, Default)]
struct OrchestratorState {
    scaled: bool,
    scale_calls: usize,
    check_calls: usize,
    scale_failure: Option<ProviderError>,
    check_failure: Option<ProviderError>,
    scale_delay: Option<Duration>,
    requests: Vec<ScaleRequest>,
    checked_providers: Vec<String>,
}

/// An [`Orchestrator`] that records calls and can be told to fail or
/// stall. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryOrchestrator {
    state: Arc<Mutex<OrchestratorState>>,
}

impl MemoryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, OrchestratorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the cluster as already scaled (or not).
    pub fn set_scaled(&self, scaled: bool) {
        self.lock().scaled = scaled;
    }

    /// Fail scale-up calls with `err` until cleared with `None`.
    pub fn fail_scale_up(&self, err: Option<ProviderError>) {
        self.lock().scale_failure = err;
    }

    /// Fail scale checks with `err` until cleared with `None`.
    pub fn fail_check(&self, err: Option<ProviderError>) {
        self.lock().check_failure = err;
    }

    /// Stall every scale-up for `delay`.
    pub fn delay_scale_up(&self, delay: Duration) {
        self.lock().scale_delay = Some(delay);
    }

    pub fn is_scaled(&self) -> bool {
        self.lock().scaled
    }

    pub fn scale_calls(&self) -> usize {
        self.lock().scale_calls
    }

    pub fn check_calls(&self) -> usize {
        self.lock().check_calls
    }

    /// Every scale-up request received, in order.
    pub fn requests(&self) -> Vec<ScaleRequest> {
        self.lock().requests.clone()
    }

    /// Provider names passed to every scale check, in order.
    pub fn checked_providers(&self) -> Vec<String> {
        self.lock().checked_providers.clone()
    }

    fn finish_scale_up(&self) -> ProviderResult<()> {
        let mut state = self.lock();
        if let Some(err) = &state.scale_failure {
            return Err(err.clone());
        }
        state.scaled = true;
        Ok(())
    }
}

impl Orchestrator for MemoryOrchestrator {
    fn scale_up<'a>(&'a self, request: &'a ScaleRequest) -> OrchestratorFuture<'a, ()> {
        let delay = {
            let mut state = self.lock();
            state.scale_calls += 1;
            state.requests.push(request.clone());
            state.scale_delay
        };
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.finish_scale_up()
        })
    }

    fn check_scaled<'a>(
        &'a self,
        _app_id: &'a str,
        _auth_token: &'a str,
        provider: &'a str,
    ) -> OrchestratorFuture<'a, bool> {
        let result = {
            let mut state = self.lock();
            state.check_calls += 1;
            state.checked_providers.push(provider.to_string());
            match &state.check_failure {
                Some(err) => Err(err.clone()),
                None => Ok(state.scaled),
            }
        };
        Box::pin(async move { result })
    }
}
