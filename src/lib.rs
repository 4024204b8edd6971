//! Migrate Microsoft Access `.mdb` files into PostgreSQL.
//!
//! The pipeline extracts schema and rows through mdbtools, folds
//! identifiers to lowercase, rewrites the handful of constructs PostgreSQL
//! rejects, provisions a database and owning role, then loads everything
//! one statement at a time.
//!
//! ```ignore
//! use mdb_import::{Config, ImportService, Importer, JobSpec, MdbTools, PgConnector};
//!
//! let config = Config::load(None)?;
//! let importer = Importer::new(MdbTools::new(config.tools.clone()), PgConnector)
//!     .with_rules(config.schema.clone());
//! let service = ImportService::new(importer, config.jobs.clone());
//!
//! let id = service.submit(JobSpec::new("Sales.mdb", "secret", config.server.clone(), "out"))?;
//! let status = service.wait(&id).await;
//! ```

pub mod artifacts;
pub mod config;
pub mod error;
pub mod extract;
pub mod identifiers;
pub mod importer;
pub mod job;
pub mod naming;
pub mod provision;
pub mod service;
pub mod sql;
pub mod target;
pub mod transform;

pub use artifacts::{Artifacts, TableArtifact};
pub use config::{Config, ConfigError, JobLimits, ServerConfig, ToolsConfig};
pub use error::ImportError;
pub use extract::{ExtractError, Extractor, MdbTools};
pub use identifiers::{IdentifierSet, TableInfo};
pub use importer::{ImportResult, Importer, LoadStats, TableReport};
pub use job::{Job, JobSpec, JobState, JobStatus, LogEntry, LogLevel, Phase};
pub use provision::{ProvisionPlan, ProvisionReport, ProvisionStep, StepOutcome};
pub use service::{ImportService, JobRegistry};
pub use target::{ConnectParams, Connector, PgConnector, SqlError, SqlSession};
pub use transform::{SchemaDocument, SchemaRules, SchemaTransformer};
