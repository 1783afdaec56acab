//! Process configuration, read once from the environment at startup.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};

/// Database engine behind the appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    Postgres,
    MariaDb,
}

impl Flavor {
    /// Default logical service name.
    pub fn default_service(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MariaDb => "mariadb",
        }
    }

    /// Environment variable holding the service name.
    pub fn service_env(self) -> &'static str {
        match self {
            Self::Postgres => "FLYNN_POSTGRES",
            Self::MariaDb => "FLYNN_MYSQL",
        }
    }

    /// Environment variable holding the admin password.
    pub fn password_env(self) -> &'static str {
        match self {
            Self::Postgres => "PGPASSWORD",
            Self::MariaDb => "MYSQL_PWD",
        }
    }

    /// Port the leader accepts client connections on.
    pub fn port(self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::MariaDb => 3306,
        }
    }

    /// URL scheme of the connection string handed to tenants.
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MariaDb => "mysql",
        }
    }

    /// Database the admin session attaches to.
    pub fn admin_database(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MariaDb => "mysql",
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_service())
    }
}

impl FromStr for Flavor {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mariadb" | "mysql" => Ok(Self::MariaDb),
            other => Err(ProviderError::InvalidArgument(format!(
                "unknown flavor {other:?}"
            ))),
        }
    }
}

/// Immutable provider configuration.
#[derive(Clone)]
pub struct ProviderConfig {
    pub flavor: Flavor,
    /// Logical cluster/service name resolved through discovery.
    pub service_name: String,
    /// Application id known to the orchestrator.
    pub app_id: String,
    /// Orchestrator auth token.
    pub controller_key: String,
    /// `host:port` of the orchestrator API.
    pub controller_addr: String,
    /// Fixed single-node topology.
    pub singleton: bool,
    /// API listen port.
    pub port: u16,
    pub admin_user: String,
    pub admin_password: String,
    /// Default deadline for a request that did not supply one.
    pub request_timeout: Duration,
    /// Budget for provisioning rollback after a failed step.
    pub compensation_timeout: Duration,
}

/// Shared handle to the process configuration.
pub type SharedConfig = Arc<ProviderConfig>;

impl ProviderConfig {
    /// Defaults for a flavor, before any environment overrides.
    pub fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            service_name: flavor.default_service().to_string(),
            app_id: String::new(),
            controller_key: String::new(),
            controller_addr: "controller.discoverd:80".to_string(),
            singleton: false,
            port: 3000,
            admin_user: "flynn".to_string(),
            admin_password: String::new(),
            request_timeout: Duration::from_secs(30),
            compensation_timeout: Duration::from_secs(10),
        }
    }

    /// Read the configuration from the process environment.
    pub fn from_env(flavor: Flavor) -> ProviderResult<Self> {
        Self::from_lookup(flavor, |key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(flavor: Flavor, lookup: F) -> ProviderResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let mut config = Self::new(flavor);

        if let Some(v) = get(flavor.service_env()) {
            config.service_name = v;
        }
        if let Some(v) = get("FLYNN_APP_ID") {
            config.app_id = v;
        }
        if let Some(v) = get("CONTROLLER_KEY") {
            config.controller_key = v;
        }
        if let Some(v) = get("CONTROLLER_ADDR") {
            config.controller_addr = v;
        }
        config.singleton = get("SINGLETON").as_deref() == Some("true");
        if let Some(v) = get("PORT") {
            config.port = parse_number("PORT", &v)?;
        }
        if let Some(v) = get(flavor.password_env()) {
            config.admin_password = v;
        }
        if let Some(v) = get("REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_number("REQUEST_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("COMPENSATION_TIMEOUT_SECS") {
            config.compensation_timeout =
                Duration::from_secs(parse_number("COMPENSATION_TIMEOUT_SECS", &v)?);
        }

        Ok(config)
    }

    /// Stable DNS name of the leader, as handed to tenants.
    pub fn leader_host(&self) -> String {
        format!("leader.{}.discoverd", self.service_name)
    }

    pub fn leader_port(&self) -> u16 {
        self.flavor.port()
    }

    /// Port of the leader's peer HTTP API (status and tunables).
    pub fn peer_port(&self) -> u16 {
        self.flavor.port() + 1
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("flavor", &self.flavor)
            .field("service_name", &self.service_name)
            .field("app_id", &self.app_id)
            .field("controller_addr", &self.controller_addr)
            .field("singleton", &self.singleton)
            .field("port", &self.port)
            .field("admin_user", &self.admin_user)
            .field("request_timeout", &self.request_timeout)
            .field("compensation_timeout", &self.compensation_timeout)
            .finish_non_exhaustive()
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> ProviderResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ProviderError::InvalidArgument(format!("{key}={value:?} is not a valid number")))
}
