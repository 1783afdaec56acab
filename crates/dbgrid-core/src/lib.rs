//! dbgrid-core — shared building blocks for the dbgrid provider.
//!
//! Holds the error taxonomy every crate reports through, the tenant and
//! tunables domain types, the credential generator, request deadlines,
//! environment configuration, and the small HTTP/1 JSON client the
//! cluster-facing crates use.

pub mod config;
pub mod deadline;
pub mod error;
pub mod http;
pub mod secret;
pub mod types;

pub use config::{Flavor, ProviderConfig, SharedConfig};
pub use deadline::Deadline;
pub use error::{ErrorKind, ProviderError, ProviderResult};
pub use secret::{SECRET_BYTES, generate_secret};
pub use types::*;
