//! dbgrid-scale — grows the store cluster on first use.
//!
//! Provisioning calls [`ScaleGate::ensure_scaled`] before touching the
//! store. The gate calls the [`Orchestrator`] at most once at a time and
//! remembers success for the life of the process.

pub mod gate;
pub mod memory;
pub mod orchestrator;

pub use gate::ScaleGate;
pub use memory::MemoryOrchestrator;
pub use orchestrator::{HttpOrchestrator, Orchestrator, ScaleRequest};
