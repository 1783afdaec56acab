//! Leader resolution.
//!
//! Leadership moves, so callers resolve on every operation and never
//! keep an [`Endpoint`] past the call that resolved it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use dbgrid_core::{Endpoint, ProviderError, ProviderResult};
use tracing::debug;

/// Boxed future returned by [`Resolver::resolve`].
pub type ResolveFuture<'a> = Pin<Box<dyn Future<Output = ProviderResult<Endpoint>> + Send + 'a>>;

/// Maps a logical service name to the address of its current leader.
pub trait Resolver: Send + Sync {
    /// Resolve the current leader of `service`.
    ///
    /// Fails with `Unavailable` when no leader is registered, which is
    /// normal before the first scale-up.
    fn resolve<'a>(&'a self, service: &'a str) -> ResolveFuture<'a>;
}

/// Resolves `leader.{service}.{domain}` through the system resolver.
#[derive(Debug, Clone)]
pub struct DnsResolver {
    domain: String,
    port: u16,
}

impl DnsResolver {
    /// Resolver for leaders listening on `port` under the `discoverd` domain.
    pub fn new(port: u16) -> Self {
        Self::with_domain("discoverd", port)
    }

    pub fn with_domain(domain: &str, port: u16) -> Self {
        Self {
            domain: domain.to_string(),
            port,
        }
    }

    /// DNS name of the leader of `service`.
    pub fn leader_name(&self, service: &str) -> String {
        format!("leader.{service}.{}", self.domain)
    }
}

impl Resolver for DnsResolver {
    fn resolve<'a>(&'a self, service: &'a str) -> ResolveFuture<'a> {
        Box::pin(async move {
            let name = self.leader_name(service);
            let mut addrs = tokio::net::lookup_host((name.as_str(), self.port))
                .await
                .map_err(|e| {
                    debug!(%name, error = %e, "leader lookup failed");
                    ProviderError::Unavailable(format!("leader of {service} not found: {e}"))
                })?;
            let addr = addrs.next().ok_or_else(|| {
                ProviderError::Unavailable(format!("leader of {service} not found"))
            })?;
            debug!(%name, %addr, "leader resolved");
            Ok(Endpoint::new(addr.ip().to_string(), addr.port()))
        })
    }
}

/// In-process leader table, for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    leaders: Arc<RwLock<HashMap<String, Endpoint>>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that already knows the leader of `service`.
    pub fn with_leader(service: &str, endpoint: Endpoint) -> Self {
        let resolver = Self::new();
        resolver.set_leader(service, endpoint);
        resolver
    }

    /// Register or move the leader of `service`.
    pub fn set_leader(&self, service: &str, endpoint: Endpoint) {
        let mut leaders = self.leaders.write().unwrap_or_else(PoisonError::into_inner);
        debug!(%service, %endpoint, "leader registered");
        leaders.insert(service.to_string(), endpoint);
    }

    /// Forget the leader of `service` (e.g. during failover).
    pub fn clear_leader(&self, service: &str) {
        let mut leaders = self.leaders.write().unwrap_or_else(PoisonError::into_inner);
        leaders.remove(service);
    }
}

impl Resolver for StaticResolver {
    fn resolve<'a>(&'a self, service: &'a str) -> ResolveFuture<'a> {
        let found = self
            .leaders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
            .cloned();
        Box::pin(async move {
            found.ok_or_else(|| ProviderError::Unavailable(format!("leader of {service} not found")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leader_name_format() {
        let dns = DnsResolver::new(5432);
        assert_eq!(dns.leader_name("postgres"), "leader.postgres.discoverd");
        let dns = DnsResolver::with_domain("svc.local", 3306);
        assert_eq!(dns.leader_name("mariadb"), "leader.mariadb.svc.local");
    }

    #[tokio::test]
    async fn static_resolver_tracks_leader_changes() {
        let resolver = StaticResolver::with_leader("pg", Endpoint::new("10.0.0.1", 5432));
        assert_eq!(resolver.resolve("pg").await.unwrap().host, "10.0.0.1");

        resolver.set_leader("pg", Endpoint::new("10.0.0.2", 5432));
        assert_eq!(resolver.resolve("pg").await.unwrap().host, "10.0.0.2");

        resolver.clear_leader("pg");
        let err = resolver.resolve("pg").await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[tokio::test]
    async fn static_resolver_unknown_service_is_unavailable() {
        let resolver = StaticResolver::new();
        let err = resolver.resolve("nothing").await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[tokio::test]
    async fn dns_resolver_unknown_name_is_unavailable() {
        let dns = DnsResolver::with_domain("invalid", 5432);
        let err = dns.resolve("no-such-service").await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
