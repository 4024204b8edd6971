//! Target database client contract.
//!
//! The pipeline only needs "connect" and "execute this SQL text". Sessions
//! run in autocommit mode: no statement is wrapped in an explicit
//! transaction, so each one takes effect (or fails) on its own.

mod postgres;

pub use postgres::{PgConnector, PgSession};

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Where and as whom to connect.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A classified statement or connection failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlError {
    #[error("syntax error [{code}]: {message}")]
    Syntax { code: String, message: String },
    #[error("integrity violation [{code}]: {message}")]
    Integrity { code: String, message: String },
    #[error("already exists [{code}]: {message}")]
    DuplicateObject { code: String, message: String },
    #[error("does not exist [{code}]: {message}")]
    UndefinedObject { code: String, message: String },
    #[error("rejected [{code}]: {message}")]
    Rejected { code: String, message: String },
    /// Transport, TLS, authentication or protocol failure.
    #[error("connection error: {0}")]
    Connection(String),
}

impl SqlError {
    /// Classify a server error by its SQLSTATE.
    pub fn from_sqlstate(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let code_owned = code.to_string();
        match code {
            "42710" | "42P04" | "42P06" | "42P07" | "42723" => SqlError::DuplicateObject {
                code: code_owned,
                message,
            },
            "3D000" | "42704" | "42P01" | "42883" => SqlError::UndefinedObject {
                code: code_owned,
                message,
            },
            "42501" => SqlError::Rejected {
                code: code_owned,
                message,
            },
            // connection exception, invalid authorization, operator intervention
            c if c.starts_with("08") || c.starts_with("28") || c.starts_with("57P") => {
                SqlError::Connection(format!("[{c}] {message}"))
            }
            c if c.starts_with("23") => SqlError::Integrity {
                code: code_owned,
                message,
            },
            c if c.starts_with("42") => SqlError::Syntax {
                code: code_owned,
                message,
            },
            _ => SqlError::Rejected {
                code: code_owned,
                message,
            },
        }
    }

    /// Only connection failures stop a job; everything else is per statement.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SqlError::Connection(_))
    }

    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            SqlError::Syntax { code, .. }
            | SqlError::Integrity { code, .. }
            | SqlError::DuplicateObject { code, .. }
            | SqlError::UndefinedObject { code, .. }
            | SqlError::Rejected { code, .. } => Some(code),
            SqlError::Connection(_) => None,
        }
    }
}

/// An open autocommit session.
#[async_trait]
pub trait SqlSession: Send {
    /// Execute SQL text without parameters.
    async fn execute(&mut self, sql: &str) -> Result<(), SqlError>;

    /// Close the session. Later calls to `execute` fail with `Connection`.
    async fn close(&mut self) -> Result<(), SqlError>;
}

/// Opens sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: SqlSession;

    async fn connect(&self, params: &ConnectParams) -> Result<Self::Session, SqlError>;
}
