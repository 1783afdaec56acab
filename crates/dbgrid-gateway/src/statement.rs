//! Statement model and dialect rendering.
//!
//! Provisioning never formats SQL by hand. It builds a [`Statement`] and a
//! [`Dialect`] renders it through [`SqlBuilder`], the one place that
//! quotes identifiers and literals. Generated names are hex, but quoting
//! does not rely on that.

use std::fmt;

use dbgrid_core::{Flavor, ProviderError, ProviderResult};

/// A provisioning or health statement, independent of SQL dialect.
#[derive(Clone, PartialEq, Eq)]
pub enum Statement {
    CreatePrincipal { principal: String, secret: String },
    CreateSchema { schema: String },
    GrantAll { schema: String, principal: String },
    /// Refuse new connections to a schema (draining stores only).
    DisallowConnections { schema: String },
    /// Kill sessions bound to a schema (draining stores only).
    TerminateSessions { schema: String },
    /// With `if_exists`, a missing schema is not an error.
    DropSchema { schema: String, if_exists: bool },
    /// With `if_exists`, a missing principal is not an error.
    DropPrincipal { principal: String, if_exists: bool },
    /// Trivial liveness query.
    Ping,
}

/// Discriminant of a [`Statement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    CreatePrincipal,
    CreateSchema,
    GrantAll,
    DisallowConnections,
    TerminateSessions,
    DropSchema,
    DropPrincipal,
    Ping,
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Self::CreatePrincipal { .. } => StatementKind::CreatePrincipal,
            Self::CreateSchema { .. } => StatementKind::CreateSchema,
            Self::GrantAll { .. } => StatementKind::GrantAll,
            Self::DisallowConnections { .. } => StatementKind::DisallowConnections,
            Self::TerminateSessions { .. } => StatementKind::TerminateSessions,
            Self::DropSchema { .. } => StatementKind::DropSchema,
            Self::DropPrincipal { .. } => StatementKind::DropPrincipal,
            Self::Ping => StatementKind::Ping,
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CreatePrincipal => "create principal",
            Self::CreateSchema => "create schema",
            Self::GrantAll => "grant",
            Self::DisallowConnections => "disallow connections",
            Self::TerminateSessions => "terminate sessions",
            Self::DropSchema => "drop schema",
            Self::DropPrincipal => "drop principal",
            Self::Ping => "ping",
        };
        f.write_str(s)
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatePrincipal { principal, .. } => f
                .debug_struct("CreatePrincipal")
                .field("principal", principal)
                .field("secret", &"<redacted>")
                .finish(),
            Self::CreateSchema { schema } => {
                f.debug_struct("CreateSchema").field("schema", schema).finish()
            }
            Self::GrantAll { schema, principal } => f
                .debug_struct("GrantAll")
                .field("schema", schema)
                .field("principal", principal)
                .finish(),
            Self::DisallowConnections { schema } => f
                .debug_struct("DisallowConnections")
                .field("schema", schema)
                .finish(),
            Self::TerminateSessions { schema } => f
                .debug_struct("TerminateSessions")
                .field("schema", schema)
                .finish(),
            Self::DropSchema { schema, if_exists } => f
                .debug_struct("DropSchema")
                .field("schema", schema)
                .field("if_exists", if_exists)
                .finish(),
            Self::DropPrincipal { principal, if_exists } => f
                .debug_struct("DropPrincipal")
                .field("principal", principal)
                .field("if_exists", if_exists)
                .finish(),
            Self::Ping => f.write_str("Ping"),
        }
    }
}

/// SQL text plus positional arguments.
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedSql {
    pub sql: String,
    pub args: Vec<String>,
}

impl fmt::Debug for RenderedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedSql")
            .field("args", &self.args.len())
            .finish_non_exhaustive()
    }
}

/// SQL dialect of the leader store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    MySql,
}

impl From<Flavor> for Dialect {
    fn from(flavor: Flavor) -> Self {
        match flavor {
            Flavor::Postgres => Self::Postgres,
            Flavor::MariaDb => Self::MySql,
        }
    }
}

const PG_TERMINATE_SESSIONS: &str = "SELECT pg_terminate_backend(pg_stat_activity.pid) \
     FROM pg_stat_activity \
     WHERE pg_stat_activity.datname = ";

impl Dialect {
    /// Whether the store can refuse and terminate sessions on a schema
    /// before it is dropped.
    pub fn supports_draining(self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// Render a statement for this dialect.
    pub fn render(self, statement: &Statement) -> ProviderResult<RenderedSql> {
        let mut b = SqlBuilder::new(self);
        match (self, statement) {
            (Self::Postgres, Statement::CreatePrincipal { principal, secret }) => {
                b.push("CREATE USER ").ident(principal)?.push(" WITH PASSWORD ").literal(secret)?;
            }
            (Self::MySql, Statement::CreatePrincipal { principal, secret }) => {
                b.push("CREATE USER ")
                    .literal(principal)?
                    .push("@'%' IDENTIFIED BY ")
                    .literal(secret)?;
            }
            (_, Statement::CreateSchema { schema }) => {
                b.push("CREATE DATABASE ").ident(schema)?;
            }
            (Self::Postgres, Statement::GrantAll { schema, principal }) => {
                b.push("GRANT ALL ON DATABASE ").ident(schema)?.push(" TO ").ident(principal)?;
            }
            (Self::MySql, Statement::GrantAll { schema, principal }) => {
                b.push("GRANT ALL ON ").ident(schema)?.push(".* TO ").literal(principal)?.push("@'%'");
            }
            (Self::Postgres, Statement::DisallowConnections { schema }) => {
                b.push("UPDATE pg_database SET datallowconn = FALSE WHERE datname = ").arg(schema)?;
            }
            (Self::Postgres, Statement::TerminateSessions { schema }) => {
                b.push(PG_TERMINATE_SESSIONS).arg(schema)?.push(" AND pid <> pg_backend_pid()");
            }
            (Self::MySql, Statement::DisallowConnections { .. } | Statement::TerminateSessions { .. }) => {
                return Err(ProviderError::Internal(format!(
                    "{} is not supported by this store",
                    statement.kind()
                )));
            }
            (_, Statement::DropSchema { schema, if_exists }) => {
                b.push(if *if_exists { "DROP DATABASE IF EXISTS " } else { "DROP DATABASE " })
                    .ident(schema)?;
            }
            (Self::Postgres, Statement::DropPrincipal { principal, if_exists }) => {
                b.push(if *if_exists { "DROP USER IF EXISTS " } else { "DROP USER " })
                    .ident(principal)?;
            }
            (Self::MySql, Statement::DropPrincipal { principal, if_exists }) => {
                b.push(if *if_exists { "DROP USER IF EXISTS " } else { "DROP USER " })
                    .literal(principal)?
                    .push("@'%'");
            }
            (_, Statement::Ping) => {
                b.push("SELECT 1");
            }
        }
        Ok(b.finish())
    }

    fn quote_ident(self, ident: &str) -> ProviderResult<String> {
        reject_empty_or_nul("identifier", ident)?;
        Ok(match self {
            Self::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
        })
    }

    fn quote_literal(self, value: &str) -> ProviderResult<String> {
        if value.contains('\0') {
            return Err(ProviderError::InvalidArgument("literal contains NUL".to_string()));
        }
        Ok(match self {
            // standard_conforming_strings is on: backslashes are literal.
            Self::Postgres => format!("'{}'", value.replace('\'', "''")),
            Self::MySql => format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''")),
        })
    }

    fn placeholder(self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            Self::MySql => "?".to_string(),
        }
    }
}

fn reject_empty_or_nul(what: &str, s: &str) -> ProviderResult<()> {
    if s.is_empty() {
        return Err(ProviderError::InvalidArgument(format!("empty {what}")));
    }
    if s.contains('\0') {
        return Err(ProviderError::InvalidArgument(format!("{what} contains NUL")));
    }
    Ok(())
}

/// Accumulates SQL text, quoting every interpolated value.
#[derive(Debug)]
pub struct SqlBuilder {
    dialect: Dialect,
    sql: String,
    args: Vec<String>,
}

impl SqlBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            args: Vec::new(),
        }
    }

    /// Append trusted SQL text.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a quoted identifier.
    pub fn ident(&mut self, ident: &str) -> ProviderResult<&mut Self> {
        let quoted = self.dialect.quote_ident(ident)?;
        self.sql.push_str(&quoted);
        Ok(self)
    }

    /// Append a quoted string literal.
    pub fn literal(&mut self, value: &str) -> ProviderResult<&mut Self> {
        let quoted = self.dialect.quote_literal(value)?;
        self.sql.push_str(&quoted);
        Ok(self)
    }

    /// Append a placeholder bound to `value`.
    pub fn arg(&mut self, value: &str) -> ProviderResult<&mut Self> {
        reject_empty_or_nul("argument", value)?;
        self.args.push(value.to_string());
        let placeholder = self.dialect.placeholder(self.args.len());
        self.sql.push_str(&placeholder);
        Ok(self)
    }

    pub fn finish(self) -> RenderedSql {
        RenderedSql {
            sql: self.sql,
            args: self.args,
        }
    }
}
