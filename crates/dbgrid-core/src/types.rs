//! Domain and wire types shared across dbgrid crates.
//!
//! The request/reply structs at the bottom are the JSON bodies exchanged
//! between the API server and its clients.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};

/// Prefix of every tenant resource id.
pub const RESOURCE_PREFIX: &str = "/databases/";

/// Separator between principal and schema inside a resource id.
pub const RESOURCE_DELIMITER: char = ':';

// ── Tenant resources ───────────────────────────────────────────────

/// A provisioned principal + schema pair.
///
/// `id` is derived from the other two fields and is the only handle
/// handed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantResource {
    pub id: String,
    pub principal: String,
    pub schema: String,
}

impl TenantResource {
    /// Build a resource and its id from its two components.
    pub fn new(principal: &str, schema: &str) -> Self {
        Self {
            id: format!("{RESOURCE_PREFIX}{principal}{RESOURCE_DELIMITER}{schema}"),
            principal: principal.to_string(),
            schema: schema.to_string(),
        }
    }

    /// Parse a resource id back into its principal and schema.
    ///
    /// The `/databases/` prefix is optional. Anything other than exactly
    /// two non-empty segments around the delimiter is rejected.
    pub fn parse(id: &str) -> ProviderResult<Self> {
        let body = id.strip_prefix(RESOURCE_PREFIX).unwrap_or(id);
        match body.split_once(RESOURCE_DELIMITER) {
            Some((principal, schema))
                if !principal.is_empty()
                    && !schema.is_empty()
                    && !schema.contains(RESOURCE_DELIMITER) =>
            {
                Ok(Self::new(principal, schema))
            }
            _ => Err(ProviderError::InvalidArgument(format!(
                "resource id {id:?} is invalid"
            ))),
        }
    }
}

// ── Tunables ───────────────────────────────────────────────────────

/// Versioned configuration blob shared by every cluster member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tunables {
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    pub version: u64,
}

// ── Cluster addressing ─────────────────────────────────────────────

/// A network address of the current leader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The same host on a different port.
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            host: self.host.clone(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Login for a leader session. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    /// Database to attach to on connect.
    pub database: String,
}

impl Credentials {
    pub fn new(user: &str, password: &str, database: &str) -> Self {
        Self {
            user: user.to_string(),
            password: password.to_string(),
            database: database.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

// ── Wire types ─────────────────────────────────────────────────────

/// Reply to a successful provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionReply {
    pub id: String,
    pub env: BTreeMap<String, String>,
}

/// Body of a deprovision request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprovisionRequest {
    pub id: String,
}

/// Query parameters of a tunables read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunablesQuery {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub resource: String,
}

/// Body of a tunables update. `version` is the version the caller read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTunablesRequest {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    pub version: u64,
}

/// Externally visible service state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Healthy,
    Unhealthy,
}

/// Reply to a status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub state: ServiceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_id_round_trip() {
        let res = TenantResource::new("a1b2", "c3d4");
        assert_eq!(res.id, "/databases/a1b2:c3d4");

        let parsed = TenantResource::parse(&res.id).unwrap();
        assert_eq!(parsed, res);
    }

    #[test]
    fn resource_id_prefix_is_optional() {
        let parsed = TenantResource::parse("user:db").unwrap();
        assert_eq!(parsed.principal, "user");
        assert_eq!(parsed.schema, "db");
        assert_eq!(parsed.id, "/databases/user:db");
    }

    #[test]
    fn resource_id_without_delimiter_is_invalid() {
        let err = TenantResource::parse("/databases/bogus").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidArgument(_)));
    }

    #[test]
    fn resource_id_with_empty_segment_is_invalid() {
        for id in ["/databases/user:", "/databases/:db", "/databases/:", "", "/databases/"] {
            let err = TenantResource::parse(id).unwrap_err();
            assert!(matches!(err, ProviderError::InvalidArgument(_)), "{id}");
        }
    }

    #[test]
    fn resource_id_with_extra_segment_is_invalid() {
        let err = TenantResource::parse("/databases/a:b:c").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidArgument(_)));
    }

    #[test]
    fn endpoint_display() {
        assert_eq!(Endpoint::new("10.0.0.1", 5432).to_string(), "10.0.0.1:5432");
        assert_eq!(Endpoint::new("::1", 5432).to_string(), "[::1]:5432");
        assert_eq!(Endpoint::new("db", 5432).with_port(5433).port, 5433);
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials::new("flynn", "s3cret", "postgres");
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("flynn"));
        assert!(!dbg.contains("s3cret"));
    }

    #[test]
    fn tunables_missing_data_defaults_empty() {
        let t: Tunables = serde_json::from_str(r#"{"version":7}"#).unwrap();
        assert!(t.data.is_empty());
        assert_eq!(t.version, 7);
    }

    #[test]
    fn status_reply_omits_empty_detail() {
        let reply = StatusReply {
            state: ServiceState::Healthy,
            detail: None,
        };
        assert_eq!(serde_json::to_string(&reply).unwrap(), r#"{"state":"healthy"}"#);
    }
}
