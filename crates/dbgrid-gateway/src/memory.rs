//! In-memory store cluster.
//!
//! [`MemoryDriver`] interprets [`Statement`]s against a small model of a
//! relational store: principals, schemas, grants and live tenant sessions.
//! It enforces the same ordering constraints a real store does (a schema
//! with live sessions cannot be dropped, a principal that still holds
//! grants cannot be dropped) and supports failure and latency injection
//! per statement kind.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dbgrid_core::{Credentials, Endpoint, ProviderError, ProviderResult};
use tracing::debug;

use crate::driver::{ConnectFuture, Driver, ExecuteFuture, Session};
use crate::statement::{Statement, StatementKind};

#[derive(Debug, Default)]
struct MemorySchema {
    allow_connections: bool,
    grants: BTreeSet<String>,
    sessions: BTreeSet<u64>,
}

#[derive(Debug)]
struct MemoryCluster {
    admin: Credentials,
    reachable: bool,
    principals: BTreeMap<String, String>,
    schemas: BTreeMap<String, MemorySchema>,
    failures: HashMap<StatementKind, ProviderError>,
    delays: HashMap<StatementKind, Duration>,
    reply_delays: HashMap<StatementKind, Duration>,
    executed: Vec<Statement>,
    endpoints: Vec<Endpoint>,
    next_session: u64,
}

impl MemoryCluster {
    fn apply(&mut self, statement: &Statement) -> ProviderResult<()> {
        match statement {
            Statement::CreatePrincipal { principal, secret } => {
                if self.principals.contains_key(principal) || *principal == self.admin.user {
                    return Err(store_error(format!("role {principal:?} already exists")));
                }
                self.principals.insert(principal.clone(), secret.clone());
            }
            Statement::CreateSchema { schema } => {
                if self.schemas.contains_key(schema) {
                    return Err(store_error(format!("database {schema:?} already exists")));
                }
                self.schemas.insert(
                    schema.clone(),
                    MemorySchema {
                        allow_connections: true,
                        ..MemorySchema::default()
                    },
                );
            }
            Statement::GrantAll { schema, principal } => {
                if !self.principals.contains_key(principal) {
                    return Err(store_error(format!("role {principal:?} does not exist")));
                }
                let entry = self
                    .schemas
                    .get_mut(schema)
                    .ok_or_else(|| store_error(format!("database {schema:?} does not exist")))?;
                entry.grants.insert(principal.clone());
            }
            // Both drain statements match zero rows on a missing schema.
            Statement::DisallowConnections { schema } => {
                if let Some(entry) = self.schemas.get_mut(schema) {
                    entry.allow_connections = false;
                }
            }
            Statement::TerminateSessions { schema } => {
                if let Some(entry) = self.schemas.get_mut(schema) {
                    entry.sessions.clear();
                }
            }
            Statement::DropSchema { schema, if_exists } => {
                let Some(entry) = self.schemas.get(schema) else {
                    if *if_exists {
                        return Ok(());
                    }
                    return Err(store_error(format!("database {schema:?} does not exist")));
                };
                if !entry.sessions.is_empty() {
                    return Err(store_error(format!(
                        "database {schema:?} is being accessed by {} other sessions",
                        entry.sessions.len()
                    )));
                }
                self.schemas.remove(schema);
            }
            Statement::DropPrincipal { principal, if_exists } => {
                if !self.principals.contains_key(principal) {
                    if *if_exists {
                        return Ok(());
                    }
                    return Err(store_error(format!("role {principal:?} does not exist")));
                }
                if self.schemas.values().any(|s| s.grants.contains(principal)) {
                    return Err(store_error(format!(
                        "role {principal:?} cannot be dropped because some objects depend on it"
                    )));
                }
                self.principals.remove(principal);
            }
            Statement::Ping => {}
        }
        Ok(())
    }
}

fn store_error(message: String) -> ProviderError {
    ProviderError::Internal(message)
}

/// A [`Driver`] over an in-process store model. Clones share the model.
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    cluster: Arc<Mutex<MemoryCluster>>,
}

impl MemoryDriver {
    /// A reachable, empty store that accepts `admin_user`/`admin_password`.
    pub fn new(admin_user: &str, admin_password: &str) -> Self {
        Self {
            cluster: Arc::new(Mutex::new(MemoryCluster {
                admin: Credentials::new(admin_user, admin_password, ""),
                reachable: true,
                principals: BTreeMap::new(),
                schemas: BTreeMap::new(),
                failures: HashMap::new(),
                delays: HashMap::new(),
                reply_delays: HashMap::new(),
                executed: Vec::new(),
                endpoints: Vec::new(),
                next_session: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryCluster> {
        self.cluster.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Fault injection ────────────────────────────────────────────

    /// Fail every statement of `kind` with `err` until cleared.
    pub fn fail_on(&self, kind: StatementKind, err: ProviderError) {
        self.lock().failures.insert(kind, err);
    }

    pub fn clear_failure(&self, kind: StatementKind) {
        self.lock().failures.remove(&kind);
    }

    /// Delay every statement of `kind` by `delay` before it applies.
    pub fn delay_on(&self, kind: StatementKind, delay: Duration) {
        self.lock().delays.insert(kind, delay);
    }

    /// Apply `kind` at once but hold its reply for `delay`. A caller that
    /// gives up in the meantime never learns the statement took effect.
    pub fn delay_reply_on(&self, kind: StatementKind, delay: Duration) {
        self.lock().reply_delays.insert(kind, delay);
    }

    /// Simulate a network partition. Unreachable stores refuse connects.
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn principals(&self) -> Vec<String> {
        self.lock().principals.keys().cloned().collect()
    }

    pub fn schemas(&self) -> Vec<String> {
        self.lock().schemas.keys().cloned().collect()
    }

    pub fn has_grant(&self, schema: &str, principal: &str) -> bool {
        self.lock()
            .schemas
            .get(schema)
            .is_some_and(|s| s.grants.contains(principal))
    }

    /// Whether new connections to `schema` are accepted.
    pub fn accepts_connections(&self, schema: &str) -> bool {
        self.lock()
            .schemas
            .get(schema)
            .is_some_and(|s| s.allow_connections)
    }

    /// Tenant sessions currently attached to `schema`.
    pub fn live_sessions(&self, schema: &str) -> usize {
        self.lock().schemas.get(schema).map_or(0, |s| s.sessions.len())
    }

    /// Every statement that reached the store, including failed ones.
    pub fn executed(&self) -> Vec<Statement> {
        self.lock().executed.clone()
    }

    pub fn executed_kinds(&self) -> Vec<StatementKind> {
        self.lock().executed.iter().map(Statement::kind).collect()
    }

    /// Number of successful connects.
    pub fn connection_count(&self) -> usize {
        self.lock().endpoints.len()
    }

    /// Endpoints of every successful connect, in order.
    pub fn connected_endpoints(&self) -> Vec<Endpoint> {
        self.lock().endpoints.clone()
    }
}

impl Driver for MemoryDriver {
    fn connect<'a>(
        &'a self,
        endpoint: &'a Endpoint,
        credentials: &'a Credentials,
    ) -> ConnectFuture<'a> {
        let result = self.open(endpoint, credentials);
        Box::pin(async move { result.map(|s| Box::new(s) as Box<dyn Session>) })
    }
}

impl MemoryDriver {
    fn open(&self, endpoint: &Endpoint, credentials: &Credentials) -> ProviderResult<MemorySession> {
        let mut cluster = self.lock();
        if !cluster.reachable {
            return Err(ProviderError::Unavailable(format!("{endpoint}: connection refused")));
        }

        let tenant = if credentials.user == cluster.admin.user {
            if credentials.password != cluster.admin.password {
                return Err(auth_failed(&credentials.user));
            }
            None
        } else {
            match cluster.principals.get(&credentials.user) {
                Some(secret) if *secret == credentials.password => {}
                _ => return Err(auth_failed(&credentials.user)),
            }
            let id = cluster.next_session;
            let schema = cluster.schemas.get_mut(&credentials.database).ok_or_else(|| {
                store_error(format!("database {:?} does not exist", credentials.database))
            })?;
            if !schema.allow_connections {
                return Err(store_error(format!(
                    "database {:?} is not currently accepting connections",
                    credentials.database
                )));
            }
            if !schema.grants.contains(&credentials.user) {
                return Err(store_error(format!(
                    "permission denied for database {:?}",
                    credentials.database
                )));
            }
            schema.sessions.insert(id);
            cluster.next_session += 1;
            Some((credentials.database.clone(), id))
        };

        cluster.endpoints.push(endpoint.clone());
        debug!(%endpoint, user = %credentials.user, "memory session opened");
        Ok(MemorySession {
            cluster: Arc::clone(&self.cluster),
            tenant,
        })
    }
}

fn auth_failed(user: &str) -> ProviderError {
    store_error(format!("password authentication failed for user {user:?}"))
}

/// A session on a [`MemoryDriver`]. Admin sessions may run any
/// statement; tenant sessions only `Ping`.
struct MemorySession {
    cluster: Arc<Mutex<MemoryCluster>>,
    tenant: Option<(String, u64)>,
}

impl MemorySession {
    fn lock(&self) -> MutexGuard<'_, MemoryCluster> {
        self.cluster.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, statement: &Statement) -> ProviderResult<()> {
        let mut cluster = self.lock();
        cluster.executed.push(statement.clone());
        if let Some(err) = cluster.failures.get(&statement.kind()) {
            return Err(err.clone());
        }
        if let Some((schema, id)) = &self.tenant {
            let alive = cluster
                .schemas
                .get(schema)
                .is_some_and(|s| s.sessions.contains(id));
            if !alive {
                return Err(store_error("terminating connection due to administrator command".to_string()));
            }
            if *statement != Statement::Ping {
                return Err(store_error(format!("permission denied: {}", statement.kind())));
            }
            return Ok(());
        }
        cluster.apply(statement)
    }
}

impl Session for MemorySession {
    fn execute<'a>(&'a mut self, statement: &'a Statement) -> ExecuteFuture<'a> {
        Box::pin(async move {
            let delay = self.lock().delays.get(&statement.kind()).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let result = self.run(statement);
            let reply_delay = self.lock().reply_delays.get(&statement.kind()).copied();
            if let Some(delay) = reply_delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }

    fn close(self: Box<Self>) -> ExecuteFuture<'static> {
        drop(self);
        Box::pin(async { Ok(()) })
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if let Some((schema, id)) = self.tenant.take() {
            let mut cluster = self.lock();
            if let Some(entry) = cluster.schemas.get_mut(&schema) {
                entry.sessions.remove(&id);
            }
        }
    }
}
