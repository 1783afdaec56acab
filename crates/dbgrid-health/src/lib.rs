//! dbgrid-health — answers the provider's `Status` operation.
//!
//! ```text
//! HealthReporter::check
//!   ├── leader status (peer API) ── read-write? ──┐
//!   ├── orchestrator check_scaled ── false → NotYetScaled
//!   └── Ping on leader ◄──────────────────────────┘ → Healthy | Unhealthy
//! ```

pub mod reporter;

pub use reporter::{HealthReporter, HealthState};
