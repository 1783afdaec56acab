//! Tenant provisioning and teardown.
//!
//! Provision runs `create principal → create schema → grant` on the
//! current leader and undoes completed steps in reverse when a later one
//! fails. Deprovision drains (where the store can), then drops schema and
//! principal, stopping at the first failure without compensation.

use std::collections::BTreeMap;
use std::sync::Arc;

use dbgrid_core::{
    Credentials, Deadline, ProviderError, ProviderResult, ProvisionReply, SECRET_BYTES,
    SharedConfig, TenantResource, generate_secret,
};
use dbgrid_gateway::{LeaderSession, Statement, StoreGateway};
use dbgrid_scale::{ScaleGate, ScaleRequest};
use tracing::{debug, info, warn};

use crate::env::connection_env;

/// A freshly provisioned tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub resource: TenantResource,
    pub env: BTreeMap<String, String>,
}

impl From<Provisioned> for ProvisionReply {
    fn from(p: Provisioned) -> Self {
        ProvisionReply {
            id: p.resource.id,
            env: p.env,
        }
    }
}

/// Runs provisioning sequences against the store leader.
#[derive(Clone)]
pub struct ProvisionEngine {
    config: SharedConfig,
    gate: Arc<ScaleGate>,
    gateway: StoreGateway,
}

impl ProvisionEngine {
    pub fn new(config: SharedConfig, gate: Arc<ScaleGate>, gateway: StoreGateway) -> Self {
        Self {
            config,
            gate,
            gateway,
        }
    }

    pub fn gateway(&self) -> &StoreGateway {
        &self.gateway
    }

    /// Create a principal and a schema it fully owns.
    ///
    /// The cluster is scaled up first if this process has not done so. On
    /// failure of step k, steps `1..k-1` are undone in reverse order under
    /// a fresh compensation deadline and the original error is returned.
    /// A step that timed out is undone as well, since the store may have
    /// applied it.
    ///
    /// The sequence runs on its own task: dropping the returned future
    /// does not stop it, so compensation still happens when the caller
    /// goes away mid-sequence.
    pub async fn provision(&self, deadline: &Deadline) -> ProviderResult<Provisioned> {
        let engine = self.clone();
        let deadline = *deadline;
        tokio::spawn(async move { engine.provision_sequence(&deadline).await })
            .await
            .map_err(|e| ProviderError::Internal(format!("provisioning task failed: {e}")))?
    }

    async fn provision_sequence(&self, deadline: &Deadline) -> ProviderResult<Provisioned> {
        self.gate
            .ensure_scaled(&ScaleRequest::from_config(&self.config), deadline)
            .await?;

        let principal = generate_secret(SECRET_BYTES);
        let secret = generate_secret(SECRET_BYTES);
        let schema = generate_secret(SECRET_BYTES);

        let steps = [
            Statement::CreatePrincipal {
                principal: principal.clone(),
                secret: secret.clone(),
            },
            Statement::CreateSchema {
                schema: schema.clone(),
            },
            Statement::GrantAll {
                schema: schema.clone(),
                principal: principal.clone(),
            },
        ];

        let mut session = self.gateway.open_session(deadline).await?;
        let mut done: Vec<&Statement> = Vec::with_capacity(steps.len());
        for step in &steps {
            if let Err(err) = session.execute(step, deadline).await {
                warn!(%principal, %schema, step = %step.kind(), error = %err, "provisioning step failed, compensating");
                if matches!(err, ProviderError::Timeout(_)) {
                    done.push(step);
                }
                // The failed call may have left the connection mid-statement.
                drop(session);
                self.compensate(&done).await;
                return Err(err);
            }
            done.push(step);
        }
        session.close(deadline).await;

        let resource = TenantResource::new(&principal, &schema);
        let tenant = Credentials::new(&principal, &secret, &schema);
        info!(id = %resource.id, "tenant provisioned");
        Ok(Provisioned {
            env: connection_env(&self.config, &tenant),
            resource,
        })
    }

    /// Best-effort reverse of `done`. Failures are logged and dropped.
    ///
    /// Undo statements tolerate missing targets: the last entry may never
    /// have reached the store.
    async fn compensate(&self, done: &[&Statement]) {
        let undo: Vec<Statement> = done.iter().rev().filter_map(|s| undo_of(s)).collect();
        if undo.is_empty() {
            return;
        }

        let deadline = Deadline::after(self.config.compensation_timeout);
        let mut session = match self.gateway.open_session(&deadline).await {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "compensation could not reach the leader");
                return;
            }
        };
        for statement in &undo {
            match session.execute(statement, &deadline).await {
                Ok(()) => debug!(step = %statement.kind(), "compensated"),
                Err(err) => {
                    warn!(step = %statement.kind(), error = %err, "compensation step failed")
                }
            }
        }
        session.close(&deadline).await;
    }

    /// Drop the tenant behind `id`.
    ///
    /// A malformed id fails with `InvalidArgument` before the store is
    /// contacted. Any failing step aborts the teardown and is returned.
    pub async fn deprovision(&self, id: &str, deadline: &Deadline) -> ProviderResult<()> {
        let resource = TenantResource::parse(id)?;

        let mut session = self.gateway.open_session(deadline).await?;
        let result = self.teardown(&mut session, &resource, deadline).await;
        session.close(deadline).await;
        result?;

        info!(id = %resource.id, "tenant deprovisioned");
        Ok(())
    }

    async fn teardown(
        &self,
        session: &mut LeaderSession,
        resource: &TenantResource,
        deadline: &Deadline,
    ) -> ProviderResult<()> {
        let schema = &resource.schema;
        if self.gateway.dialect().supports_draining() {
            session
                .execute(&Statement::DisallowConnections { schema: schema.clone() }, deadline)
                .await?;
            session
                .execute(&Statement::TerminateSessions { schema: schema.clone() }, deadline)
                .await?;
        }
        session
            .execute(
                &Statement::DropSchema {
                    schema: schema.clone(),
                    if_exists: false,
                },
                deadline,
            )
            .await?;
        session
            .execute(
                &Statement::DropPrincipal {
                    principal: resource.principal.clone(),
                    if_exists: false,
                },
                deadline,
            )
            .await
    }
}

fn undo_of(statement: &Statement) -> Option<Statement> {
    match statement {
        Statement::CreatePrincipal { principal, .. } => Some(Statement::DropPrincipal {
            principal: principal.clone(),
            if_exists: true,
        }),
        Statement::CreateSchema { schema } => Some(Statement::DropSchema {
            schema: schema.clone(),
            if_exists: true,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dbgrid_core::{Endpoint, Flavor, ProviderConfig, ProviderError};
    use dbgrid_gateway::{Driver, MemoryDriver, StatementKind, StaticResolver};
    use dbgrid_scale::MemoryOrchestrator;

    use super::*;

    struct Harness {
        engine: ProvisionEngine,
        driver: MemoryDriver,
        orchestrator: MemoryOrchestrator,
        resolver: StaticResolver,
    }

    fn harness(flavor: Flavor) -> Harness {
        let mut config = ProviderConfig::new(flavor);
        config.admin_password = "adminpw".to_string();
        config.app_id = "app1".to_string();
        let config = Arc::new(config);

        let resolver = StaticResolver::with_leader(
            &config.service_name,
            Endpoint::new("10.0.0.1", config.leader_port()),
        );
        let driver = MemoryDriver::new("flynn", "adminpw");
        let orchestrator = MemoryOrchestrator::new();
        let gate = Arc::new(ScaleGate::new(Arc::new(orchestrator.clone())));
        let gateway = StoreGateway::from_config(
            &config,
            Arc::new(resolver.clone()),
            Arc::new(driver.clone()),
        );
        Harness {
            engine: ProvisionEngine::new(config, gate, gateway),
            driver,
            orchestrator,
            resolver,
        }
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(10))
    }

    /// Credentials generated by the first `CreatePrincipal` the store saw.
    fn generated_principal(driver: &MemoryDriver) -> (String, String) {
        driver
            .executed()
            .into_iter()
            .find_map(|s| match s {
                Statement::CreatePrincipal { principal, secret } => Some((principal, secret)),
                _ => None,
            })
            .unwrap()
    }

    fn generated_schema(driver: &MemoryDriver) -> String {
        driver
            .executed()
            .into_iter()
            .find_map(|s| match s {
                Statement::CreateSchema { schema } => Some(schema),
                _ => None,
            })
            .unwrap()
    }

    async fn tenant_can_connect(driver: &MemoryDriver, user: &str, password: &str, db: &str) -> bool {
        let endpoint = Endpoint::new("10.0.0.1", 5432);
        let creds = Credentials::new(user, password, db);
        driver.connect(&endpoint, &creds).await.is_ok()
    }

    #[tokio::test]
    async fn provision_creates_tenant_and_env() {
        let h = harness(Flavor::Postgres);
        let p = h.engine.provision(&deadline()).await.unwrap();

        let parsed = TenantResource::parse(&p.resource.id).unwrap();
        assert_eq!(parsed, p.resource);
        assert_eq!(p.resource.principal.len(), 2 * SECRET_BYTES);
        assert_eq!(p.resource.schema.len(), 2 * SECRET_BYTES);
        assert_ne!(p.resource.principal, p.resource.schema);

        assert_eq!(p.env["PGUSER"], p.resource.principal);
        assert_eq!(p.env["PGDATABASE"], p.resource.schema);
        assert_eq!(p.env["PGHOST"], "leader.postgres.discoverd");
        assert!(p.env["DATABASE_URL"].starts_with(&format!("postgres://{}:", p.resource.principal)));

        assert!(h.driver.has_grant(&p.resource.schema, &p.resource.principal));
        assert!(
            tenant_can_connect(&h.driver, &p.env["PGUSER"], &p.env["PGPASSWORD"], &p.env["PGDATABASE"]).await
        );
        assert_eq!(
            h.driver.executed_kinds(),
            vec![
                StatementKind::CreatePrincipal,
                StatementKind::CreateSchema,
                StatementKind::GrantAll
            ]
        );
    }

    #[tokio::test]
    async fn scale_up_happens_once_across_provisions() {
        let h = harness(Flavor::Postgres);
        h.engine.provision(&deadline()).await.unwrap();
        h.engine.provision(&deadline()).await.unwrap();
        assert_eq!(h.orchestrator.scale_calls(), 1);
        assert_eq!(h.driver.principals().len(), 2);
    }

    #[tokio::test]
    async fn scale_failure_touches_nothing() {
        let h = harness(Flavor::Postgres);
        h.orchestrator
            .fail_scale_up(Some(ProviderError::Unavailable("controller down".into())));

        let err = h.engine.provision(&deadline()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
        assert_eq!(h.driver.connection_count(), 0);
    }

    #[tokio::test]
    async fn grant_failure_rolls_back_schema_then_principal() {
        let h = harness(Flavor::Postgres);
        h.driver
            .fail_on(StatementKind::GrantAll, ProviderError::Internal("grant refused".into()));

        let err = h.engine.provision(&deadline()).await.unwrap_err();
        assert_eq!(err, ProviderError::Internal("grant refused".into()));

        assert!(h.driver.principals().is_empty());
        assert!(h.driver.schemas().is_empty());
        assert_eq!(
            h.driver.executed_kinds(),
            vec![
                StatementKind::CreatePrincipal,
                StatementKind::CreateSchema,
                StatementKind::GrantAll,
                StatementKind::DropSchema,
                StatementKind::DropPrincipal,
            ]
        );

        let (user, secret) = generated_principal(&h.driver);
        let schema = generated_schema(&h.driver);
        assert!(!tenant_can_connect(&h.driver, &user, &secret, &schema).await);
    }

    #[tokio::test]
    async fn schema_failure_rolls_back_principal_only() {
        let h = harness(Flavor::Postgres);
        h.driver
            .fail_on(StatementKind::CreateSchema, ProviderError::Internal("disk full".into()));

        h.engine.provision(&deadline()).await.unwrap_err();

        assert!(h.driver.principals().is_empty());
        assert_eq!(
            h.driver.executed_kinds(),
            vec![
                StatementKind::CreatePrincipal,
                StatementKind::CreateSchema,
                StatementKind::DropPrincipal,
            ]
        );
    }

    #[tokio::test]
    async fn first_step_failure_needs_no_compensation() {
        let h = harness(Flavor::Postgres);
        h.driver
            .fail_on(StatementKind::CreatePrincipal, ProviderError::Internal("nope".into()));

        h.engine.provision(&deadline()).await.unwrap_err();
        assert_eq!(h.driver.executed_kinds(), vec![StatementKind::CreatePrincipal]);
        assert_eq!(h.driver.connection_count(), 1);
    }

    #[tokio::test]
    async fn compensation_failure_does_not_mask_original_error() {
        let h = harness(Flavor::Postgres);
        h.driver
            .fail_on(StatementKind::GrantAll, ProviderError::Internal("grant refused".into()));
        h.driver
            .fail_on(StatementKind::DropSchema, ProviderError::Internal("drop refused".into()));

        let err = h.engine.provision(&deadline()).await.unwrap_err();
        assert_eq!(err, ProviderError::Internal("grant refused".into()));
        // The schema survives but the principal drop is still attempted.
        assert_eq!(h.driver.executed_kinds().last(), Some(&StatementKind::DropPrincipal));
        assert_eq!(h.driver.schemas().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_step_is_compensated() {
        let h = harness(Flavor::Postgres);
        h.driver.delay_on(StatementKind::CreateSchema, Duration::from_secs(60));

        let err = h
            .engine
            .provision(&Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
        assert!(h.driver.principals().is_empty());
        assert!(h.driver.schemas().is_empty());
        assert_eq!(h.driver.executed_kinds().last(), Some(&StatementKind::DropPrincipal));
    }

    #[tokio::test(start_paused = true)]
    async fn schema_applied_but_unacknowledged_is_dropped() {
        let h = harness(Flavor::Postgres);
        h.driver.delay_reply_on(StatementKind::CreateSchema, Duration::from_secs(60));

        let err = h
            .engine
            .provision(&Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
        assert!(h.driver.schemas().is_empty());
        assert!(h.driver.principals().is_empty());
        assert_eq!(
            h.driver.executed_kinds(),
            vec![
                StatementKind::CreatePrincipal,
                StatementKind::CreateSchema,
                StatementKind::DropSchema,
                StatementKind::DropPrincipal,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_provision_still_compensates() {
        let h = harness(Flavor::Postgres);
        h.driver.delay_on(StatementKind::GrantAll, Duration::from_secs(30));

        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            h.engine.provision(&Deadline::after(Duration::from_secs(10))),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(h.driver.principals().is_empty());
        assert!(h.driver.schemas().is_empty());
        assert_eq!(h.driver.executed_kinds().last(), Some(&StatementKind::DropPrincipal));
    }

    #[tokio::test]
    async fn deprovision_round_trip_with_draining() {
        let h = harness(Flavor::Postgres);
        let p = h.engine.provision(&deadline()).await.unwrap();

        // A tenant connection that would block DROP DATABASE.
        let endpoint = Endpoint::new("10.0.0.1", 5432);
        let creds = Credentials::new(&p.env["PGUSER"], &p.env["PGPASSWORD"], &p.env["PGDATABASE"]);
        let _tenant = h.driver.connect(&endpoint, &creds).await.unwrap();
        assert_eq!(h.driver.live_sessions(&p.resource.schema), 1);

        h.engine.deprovision(&p.resource.id, &deadline()).await.unwrap();

        assert!(h.driver.principals().is_empty());
        assert!(h.driver.schemas().is_empty());
        assert_eq!(
            h.driver.executed_kinds()[3..],
            [
                StatementKind::DisallowConnections,
                StatementKind::TerminateSessions,
                StatementKind::DropSchema,
                StatementKind::DropPrincipal,
            ]
        );
    }

    #[tokio::test]
    async fn mariadb_skips_draining() {
        let h = harness(Flavor::MariaDb);
        let p = h.engine.provision(&deadline()).await.unwrap();
        assert_eq!(p.env["MYSQL_USER"], p.resource.principal);

        h.engine.deprovision(&p.resource.id, &deadline()).await.unwrap();
        assert_eq!(
            h.driver.executed_kinds()[3..],
            [StatementKind::DropSchema, StatementKind::DropPrincipal]
        );
    }

    #[tokio::test]
    async fn malformed_id_makes_no_store_calls() {
        let h = harness(Flavor::Postgres);
        let err = h
            .engine
            .deprovision("/databases/bogus", &deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidArgument(_)));
        assert_eq!(h.driver.connection_count(), 0);
        assert!(h.driver.executed().is_empty());
    }

    #[tokio::test]
    async fn deprovision_stops_at_first_failure() {
        let h = harness(Flavor::Postgres);
        let p = h.engine.provision(&deadline()).await.unwrap();
        h.driver
            .fail_on(StatementKind::DropSchema, ProviderError::Internal("busy".into()));

        let err = h.engine.deprovision(&p.resource.id, &deadline()).await.unwrap_err();
        assert_eq!(err, ProviderError::Internal("busy".into()));
        assert_eq!(h.driver.principals(), vec![p.resource.principal.clone()]);
        assert_eq!(h.driver.executed_kinds().last(), Some(&StatementKind::DropSchema));
    }

    #[tokio::test]
    async fn no_leader_is_unavailable() {
        let h = harness(Flavor::Postgres);
        h.resolver.clear_leader("postgres");
        let err = h.engine.provision(&deadline()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
