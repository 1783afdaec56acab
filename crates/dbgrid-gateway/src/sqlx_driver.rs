//! [`Driver`] backed by sqlx connections to PostgreSQL or MariaDB.
//!
//! Each session owns a single unpooled connection; the provider opens one
//! per operation and leadership may have moved by the next one.

use dbgrid_core::{Credentials, Endpoint, ProviderError, ProviderResult};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor};
use tracing::debug;

use crate::driver::{ConnectFuture, Driver, ExecuteFuture, Session};
use crate::statement::{Dialect, RenderedSql, Statement};

/// Connects with sqlx using the wire protocol of `dialect`.
#[derive(Debug, Clone, Copy)]
pub struct SqlxDriver {
    dialect: Dialect,
}

impl SqlxDriver {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }
}

impl Driver for SqlxDriver {
    fn connect<'a>(
        &'a self,
        endpoint: &'a Endpoint,
        credentials: &'a Credentials,
    ) -> ConnectFuture<'a> {
        Box::pin(async move {
            let conn = match self.dialect {
                Dialect::Postgres => {
                    let opts = PgConnectOptions::new()
                        .host(&endpoint.host)
                        .port(endpoint.port)
                        .username(&credentials.user)
                        .password(&credentials.password)
                        .database(&credentials.database);
                    let conn = PgConnection::connect_with(&opts)
                        .await
                        .map_err(map_sqlx_error)?;
                    Conn::Postgres(conn)
                }
                Dialect::MySql => {
                    let opts = MySqlConnectOptions::new()
                        .host(&endpoint.host)
                        .port(endpoint.port)
                        .username(&credentials.user)
                        .password(&credentials.password)
                        .database(&credentials.database);
                    let conn = MySqlConnection::connect_with(&opts)
                        .await
                        .map_err(map_sqlx_error)?;
                    Conn::MySql(conn)
                }
            };
            debug!(%endpoint, user = %credentials.user, "store session opened");
            Ok(Box::new(SqlxSession {
                dialect: self.dialect,
                conn,
            }) as Box<dyn Session>)
        })
    }
}

enum Conn {
    Postgres(PgConnection),
    MySql(MySqlConnection),
}

/// One live sqlx connection.
pub struct SqlxSession {
    dialect: Dialect,
    conn: Conn,
}

impl Session for SqlxSession {
    fn execute<'a>(&'a mut self, statement: &'a Statement) -> ExecuteFuture<'a> {
        Box::pin(async move {
            let rendered = self.dialect.render(statement)?;
            debug!(kind = %statement.kind(), "executing statement");
            match &mut self.conn {
                Conn::Postgres(conn) => execute_pg(conn, &rendered).await,
                Conn::MySql(conn) => execute_mysql(conn, &rendered).await,
            }
        })
    }

    fn close(self: Box<Self>) -> ExecuteFuture<'static> {
        Box::pin(async move {
            match self.conn {
                Conn::Postgres(conn) => conn.close().await,
                Conn::MySql(conn) => conn.close().await,
            }
            .map_err(map_sqlx_error)
        })
    }
}

// Statements without arguments go through the simple query protocol;
// utility commands like CREATE DATABASE cannot be prepared on every store.
async fn execute_pg(conn: &mut PgConnection, rendered: &RenderedSql) -> ProviderResult<()> {
    if rendered.args.is_empty() {
        (&mut *conn)
            .execute(rendered.sql.as_str())
            .await
            .map_err(map_sqlx_error)?;
    } else {
        let mut query = sqlx::query(rendered.sql.as_str());
        for arg in &rendered.args {
            query = query.bind(arg.as_str());
        }
        query.execute(&mut *conn).await.map_err(map_sqlx_error)?;
    }
    Ok(())
}

async fn execute_mysql(conn: &mut MySqlConnection, rendered: &RenderedSql) -> ProviderResult<()> {
    if rendered.args.is_empty() {
        (&mut *conn)
            .execute(rendered.sql.as_str())
            .await
            .map_err(map_sqlx_error)?;
    } else {
        let mut query = sqlx::query(rendered.sql.as_str());
        for arg in &rendered.args {
            query = query.bind(arg.as_str());
        }
        query.execute(&mut *conn).await.map_err(map_sqlx_error)?;
    }
    Ok(())
}

/// Map a sqlx failure onto the provider error taxonomy.
pub fn map_sqlx_error(err: sqlx::Error) -> ProviderError {
    match err {
        sqlx::Error::Io(e) => ProviderError::Unavailable(format!("store unreachable: {e}")),
        sqlx::Error::Tls(e) => ProviderError::Unavailable(format!("store tls: {e}")),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            ProviderError::Unavailable("store pool unavailable".to_string())
        }
        sqlx::Error::Configuration(e) => {
            ProviderError::InvalidArgument(format!("store configuration: {e}"))
        }
        sqlx::Error::Database(e) => ProviderError::Internal(e.message().to_string()),
        other => ProviderError::Internal(other.to_string()),
    }
}
