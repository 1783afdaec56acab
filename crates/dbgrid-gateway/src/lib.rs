//! dbgrid-gateway — the provider's only path to the store cluster.
//!
//! Resolves the current leader of the store service through a
//! [`Resolver`], authenticates an admin session on it through a
//! [`Driver`], and executes dialect-rendered [`Statement`]s under a
//! caller deadline. [`SqlxDriver`] talks to real PostgreSQL or MariaDB;
//! [`MemoryDriver`] models a store in-process for tests and `--in-memory`
//! runs.

pub mod discovery;
pub mod driver;
pub mod gateway;
pub mod memory;
pub mod sqlx_driver;
pub mod statement;

pub use discovery::{DnsResolver, Resolver, StaticResolver};
pub use driver::{Driver, Session};
pub use gateway::{LeaderSession, StoreGateway};
pub use memory::MemoryDriver;
pub use sqlx_driver::SqlxDriver;
pub use statement::{Dialect, RenderedSql, SqlBuilder, Statement, StatementKind};
