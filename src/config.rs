//! Configuration loaded from `config.toml`.
//!
//! Every field has a default, so a missing file is fine. The default location
//! is `<config_dir>/mdb-import/config.toml`:
//!
//! ```toml
//! [server]
//! host = "db.internal"
//! port = 5432
//! admin_user = "postgres"
//!
//! [tools]
//! mdb_export = "/opt/mdbtools/bin/mdb-export"
//! timeout_secs = 600
//!
//! [schema]
//! excluded_prefixes = ["ALTER TABLE", "CREATE INDEX", "CREATE UNIQUE INDEX"]
//! type_rewrites = { BOOL = "INTEGER" }
//!
//! [jobs]
//! max_jobs = 16
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transform::SchemaRules;

/// Errors reading or parsing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub tools: ToolsConfig,
    pub schema: SchemaRules,
    pub jobs: JobLimits,
}

impl Config {
    /// `<config_dir>/mdb-import/config.toml`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mdb-import").join("config.toml"))
    }

    /// Load from an explicit path, or from the default path if it exists.
    ///
    /// An explicit path that cannot be read is an error; a missing default
    /// file yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::read(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::read(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Target PostgreSQL server and the administrator used for provisioning.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub admin_user: String,
    #[serde(skip_serializing)]
    pub admin_password: Option<String>,
    /// Maintenance database the administrator connects to.
    pub admin_database: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            admin_user: "postgres".to_string(),
            admin_password: None,
            admin_database: "postgres".to_string(),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("admin_user", &self.admin_user)
            .field("admin_password", &self.admin_password.as_ref().map(|_| "***"))
            .field("admin_database", &self.admin_database)
            .finish()
    }
}

impl ServerConfig {
    /// `host:port`, for messages.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Locations of the mdbtools programs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub mdb_tables: String,
    pub mdb_export: String,
    pub mdb_schema: String,
    /// Backend passed to `mdb-schema` and `mdb-export -I`.
    pub dialect: String,
    /// Quote character for text values in exported inserts.
    pub quote_char: String,
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mdb_tables: "mdb-tables".to_string(),
            mdb_export: "mdb-export".to_string(),
            mdb_schema: "mdb-schema".to_string(),
            dialect: "postgres".to_string(),
            quote_char: "'".to_string(),
            timeout_secs: 300,
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Bounds on the in-memory job registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobLimits {
    pub max_jobs: usize,
    /// How long a finished job stays queryable.
    pub retention_secs: u64,
}

impl Default for JobLimits {
    fn default() -> Self {
        Self {
            max_jobs: 64,
            retention_secs: 24 * 60 * 60,
        }
    }
}

impl JobLimits {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}
