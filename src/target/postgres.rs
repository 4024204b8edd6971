//! PostgreSQL sessions over sqlx.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor};
use tracing::debug;

use super::{ConnectParams, Connector, SqlError, SqlSession};

impl From<sqlx::Error> for SqlError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
                SqlError::from_sqlstate(&code, db.message())
            }
            other => SqlError::Connection(other.to_string()),
        }
    }
}

/// Opens single `PgConnection`s; no pooling, a job holds one at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    type Session = PgSession;

    async fn connect(&self, params: &ConnectParams) -> Result<PgSession, SqlError> {
        let mut options = PgConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.user)
            .database(&params.database);
        if let Some(password) = &params.password {
            options = options.password(password);
        }

        debug!(host = %params.host, database = %params.database, user = %params.user, "connecting");
        let conn = PgConnection::connect_with(&options).await?;
        Ok(PgSession { conn: Some(conn) })
    }
}

/// One connection. Outside an explicit transaction every statement commits
/// on its own.
pub struct PgSession {
    conn: Option<PgConnection>,
}

#[async_trait]
impl SqlSession for PgSession {
    async fn execute(&mut self, sql: &str) -> Result<(), SqlError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| SqlError::Connection("session is closed".to_string()))?;
        // A bare `&str` has no arguments and goes over the simple query
        // protocol; utility statements such as CREATE DATABASE cannot be
        // prepared.
        Executor::execute(conn, sql).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SqlError> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }
}
