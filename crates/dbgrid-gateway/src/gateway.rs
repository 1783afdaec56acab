//! Leader-bound administrative sessions.

use std::sync::Arc;

use dbgrid_core::{Credentials, Deadline, Endpoint, ProviderConfig, ProviderResult};
use tracing::{debug, warn};

use crate::discovery::Resolver;
use crate::driver::{Driver, Session};
use crate::statement::{Dialect, Statement};

/// Opens admin sessions on whichever instance currently leads `service`.
///
/// Nothing is cached between calls: every [`open_session`] resolves the
/// leader again.
///
/// [`open_session`]: StoreGateway::open_session
#[derive(Clone)]
pub struct StoreGateway {
    resolver: Arc<dyn Resolver>,
    driver: Arc<dyn Driver>,
    service: String,
    credentials: Credentials,
    dialect: Dialect,
}

impl StoreGateway {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        driver: Arc<dyn Driver>,
        service: &str,
        credentials: Credentials,
        dialect: Dialect,
    ) -> Self {
        Self {
            resolver,
            driver,
            service: service.to_string(),
            credentials,
            dialect,
        }
    }

    /// Gateway using the admin login and service name from `config`.
    pub fn from_config(
        config: &ProviderConfig,
        resolver: Arc<dyn Resolver>,
        driver: Arc<dyn Driver>,
    ) -> Self {
        let credentials = Credentials::new(
            &config.admin_user,
            &config.admin_password,
            config.flavor.admin_database(),
        );
        Self::new(
            resolver,
            driver,
            &config.service_name,
            credentials,
            config.flavor.into(),
        )
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Current leader address.
    pub async fn resolve_leader(&self, deadline: &Deadline) -> ProviderResult<Endpoint> {
        deadline
            .run("resolve leader", self.resolver.resolve(&self.service))
            .await
    }

    /// Resolve the leader and open an authenticated admin session on it.
    pub async fn open_session(&self, deadline: &Deadline) -> ProviderResult<LeaderSession> {
        let endpoint = self.resolve_leader(deadline).await?;
        let inner = deadline
            .run("connect to leader", self.driver.connect(&endpoint, &self.credentials))
            .await?;
        debug!(service = %self.service, %endpoint, "leader session opened");
        Ok(LeaderSession { endpoint, inner })
    }

    /// Run a trivial query on the leader.
    pub async fn ping(&self, deadline: &Deadline) -> ProviderResult<()> {
        let mut session = self.open_session(deadline).await?;
        let result = session.execute(&Statement::Ping, deadline).await;
        session.close(deadline).await;
        result
    }
}

/// An admin session pinned to the leader that was current when it opened.
pub struct LeaderSession {
    endpoint: Endpoint,
    inner: Box<dyn Session>,
}

impl LeaderSession {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Execute one statement within `deadline`.
    pub async fn execute(&mut self, statement: &Statement, deadline: &Deadline) -> ProviderResult<()> {
        let what = statement.kind().to_string();
        let result = deadline.run(&what, self.inner.execute(statement)).await;
        if let Err(err) = &result {
            debug!(endpoint = %self.endpoint, statement = %what, error = %err, "statement failed");
        }
        result
    }

    /// Close the session within `deadline`. A close that fails or runs
    /// past the deadline is logged and the connection abandoned.
    pub async fn close(self, deadline: &Deadline) {
        let Self { endpoint, inner } = self;
        if let Err(err) = deadline.run("close session", inner.close()).await {
            warn!(%endpoint, error = %err, "closing leader session failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dbgrid_core::{Flavor, ProviderError};

    use super::*;
    use crate::discovery::StaticResolver;
    use crate::driver::{ConnectFuture, ExecuteFuture};
    use crate::memory::MemoryDriver;
    use crate::statement::StatementKind;

    /// A leader that accepts connections and then stops answering.
    struct StalledDriver {
        stall_execute: bool,
    }

    struct StalledSession {
        stall_execute: bool,
    }

    impl Driver for StalledDriver {
        fn connect<'a>(&'a self, _: &'a Endpoint, _: &'a Credentials) -> ConnectFuture<'a> {
            let stall_execute = self.stall_execute;
            Box::pin(async move { Ok(Box::new(StalledSession { stall_execute }) as Box<dyn Session>) })
        }
    }

    impl Session for StalledSession {
        fn execute<'a>(&'a mut self, _: &'a Statement) -> ExecuteFuture<'a> {
            let stall = self.stall_execute;
            Box::pin(async move {
                if stall {
                    std::future::pending::<()>().await;
                }
                Ok(())
            })
        }

        fn close(self: Box<Self>) -> ExecuteFuture<'static> {
            Box::pin(std::future::pending())
        }
    }

    fn stalled_gateway(stall_execute: bool) -> StoreGateway {
        let resolver = StaticResolver::with_leader("postgres", Endpoint::new("10.0.0.1", 5432));
        let mut config = ProviderConfig::new(Flavor::Postgres);
        config.admin_password = "adminpw".to_string();
        StoreGateway::from_config(
            &config,
            Arc::new(resolver),
            Arc::new(StalledDriver { stall_execute }),
        )
    }

    fn gateway(resolver: &StaticResolver, driver: &MemoryDriver) -> StoreGateway {
        let mut config = ProviderConfig::new(Flavor::Postgres);
        config.admin_password = "adminpw".to_string();
        StoreGateway::from_config(&config, Arc::new(resolver.clone()), Arc::new(driver.clone()))
    }

    #[tokio::test]
    async fn resolves_leader_on_every_session() {
        let resolver = StaticResolver::with_leader("postgres", Endpoint::new("10.0.0.1", 5432));
        let driver = MemoryDriver::new("flynn", "adminpw");
        let gw = gateway(&resolver, &driver);
        let deadline = Deadline::after(Duration::from_secs(5));

        gw.ping(&deadline).await.unwrap();
        resolver.set_leader("postgres", Endpoint::new("10.0.0.2", 5432));
        gw.ping(&deadline).await.unwrap();

        let hosts: Vec<_> = driver
            .connected_endpoints()
            .into_iter()
            .map(|e| e.host)
            .collect();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[tokio::test]
    async fn no_leader_is_unavailable() {
        let resolver = StaticResolver::new();
        let driver = MemoryDriver::new("flynn", "adminpw");
        let gw = gateway(&resolver, &driver);

        let err = gw
            .open_session(&Deadline::after(Duration::from_secs(5)))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::Unavailable(_)));
        assert_eq!(driver.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_statement_times_out() {
        let resolver = StaticResolver::with_leader("postgres", Endpoint::new("10.0.0.1", 5432));
        let driver = MemoryDriver::new("flynn", "adminpw");
        driver.delay_on(StatementKind::Ping, Duration::from_secs(60));
        let gw = gateway(&resolver, &driver);

        let err = gw.ping(&Deadline::after(Duration::from_secs(1))).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_close_is_bounded_by_deadline() {
        let gw = stalled_gateway(false);
        let outcome = tokio::time::timeout(
            Duration::from_secs(3600),
            gw.ping(&Deadline::after(Duration::from_secs(1))),
        )
        .await;
        assert_eq!(outcome, Ok(Ok(())));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_leader_ping_times_out() {
        let gw = stalled_gateway(true);
        let outcome = tokio::time::timeout(
            Duration::from_secs(3600),
            gw.ping(&Deadline::after(Duration::from_secs(1))),
        )
        .await
        .expect("ping returns once the deadline passes");
        assert!(matches!(outcome, Err(ProviderError::Timeout(_))));
    }

    #[test]
    fn dialect_follows_flavor() {
        let resolver = StaticResolver::new();
        let driver = MemoryDriver::new("flynn", "");
        let config = ProviderConfig::new(Flavor::MariaDb);
        let gw = StoreGateway::from_config(&config, Arc::new(resolver), Arc::new(driver));
        assert_eq!(gw.dialect(), Dialect::MySql);
        assert_eq!(gw.service(), "mariadb");
    }
}
