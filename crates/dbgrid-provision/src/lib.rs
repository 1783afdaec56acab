//! dbgrid-provision — tenant lifecycle on the store leader.

pub mod engine;
pub mod env;

pub use engine::{ProvisionEngine, Provisioned};
pub use env::{connection_env, connection_url};
