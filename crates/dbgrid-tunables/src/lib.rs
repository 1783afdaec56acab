//! dbgrid-tunables — leader status and the tunables update protocol.
//!
//! Tunables are a versioned key/value blob replicated across the store
//! cluster. Writers read `{data, version}`, edit the data locally, and
//! submit it with `version + 1`; the leader rejects anything that does not
//! follow its current version with `Conflict`. There is no lock across the
//! read-modify-write span.

pub mod changes;
pub mod client;
pub mod memory;
pub mod service;

pub use changes::TunableChanges;
pub use client::{HttpLeaderClient, LeaderClient, LeaderStatus};
pub use memory::MemoryLeaderClient;
pub use service::TunablesService;
