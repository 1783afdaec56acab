//! In-process leader peer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dbgrid_core::{Endpoint, ProviderError, ProviderResult, Tunables};

use crate::client::{LeaderClient, LeaderStatus, PeerFuture};

#[derive(Debug)]
struct PeerState {
    tunables: Tunables,
    status: LeaderStatus,
    reachable: bool,
    updates: usize,
}

/// A [`LeaderClient`] whose peer lives in memory. The tunables blob is
/// replaced with an atomic compare-and-set; clones share state.
#[derive(Debug, Clone)]
pub struct MemoryLeaderClient {
    state: Arc<Mutex<PeerState>>,
}

impl Default for MemoryLeaderClient {
    fn default() -> Self {
        Self::new(Tunables::default())
    }
}

impl MemoryLeaderClient {
    /// A reachable, read-write peer holding `tunables`.
    pub fn new(tunables: Tunables) -> Self {
        Self {
            state: Arc::new(Mutex::new(PeerState {
                tunables,
                status: LeaderStatus::read_write(),
                reachable: true,
                updates: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: LeaderStatus) {
        self.lock().status = status;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Overwrite the blob, as another cluster member would.
    pub fn set_tunables(&self, tunables: Tunables) {
        self.lock().tunables = tunables;
    }

    /// Current blob on the peer.
    pub fn tunables(&self) -> Tunables {
        self.lock().tunables.clone()
    }

    /// Number of accepted updates.
    pub fn update_count(&self) -> usize {
        self.lock().updates
    }

    fn reachable(&self, peer: &Endpoint) -> ProviderResult<MutexGuard<'_, PeerState>> {
        let state = self.lock();
        if !state.reachable {
            return Err(ProviderError::Unavailable(format!("{peer}: connection refused")));
        }
        Ok(state)
    }
}

impl LeaderClient for MemoryLeaderClient {
    fn status<'a>(&'a self, peer: &'a Endpoint) -> PeerFuture<'a, LeaderStatus> {
        let result = self.reachable(peer).map(|s| s.status.clone());
        Box::pin(async move { result })
    }

    fn get_tunables<'a>(&'a self, peer: &'a Endpoint) -> PeerFuture<'a, Tunables> {
        let result = self.reachable(peer).map(|s| s.tunables.clone());
        Box::pin(async move { result })
    }

    fn update_tunables<'a>(&'a self, peer: &'a Endpoint, tunables: &'a Tunables) -> PeerFuture<'a, ()> {
        let result = self.reachable(peer).and_then(|mut state| {
            let current = state.tunables.version;
            if current.checked_add(1) != Some(tunables.version) {
                return Err(ProviderError::Conflict(format!(
                    "version {} does not follow current version {current}",
                    tunables.version
                )));
            }
            state.tunables = tunables.clone();
            state.updates += 1;
            Ok(())
        });
        Box::pin(async move { result })
    }
}
