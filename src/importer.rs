//! Import orchestrator.
//!
//! Drives one job through
//! `created → registry-built → schema-transformed → provisioned →
//! schema-loaded → rows-loaded → finished`.
//!
//! Everything up to and including writing artifacts happens before the
//! server is contacted, so a broken source never costs a rename or a role.
//! After provisioning the load is best effort: a failing statement is
//! logged and the next one runs. Only connection-level failures abort.

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::artifacts::{self, ArtifactWriter, Artifacts};
use crate::error::ImportError;
use crate::extract::Extractor;
use crate::identifiers::IdentifierSet;
use crate::job::{Job, JobSpec, Phase};
use crate::naming;
use crate::provision::{provision, ProvisionPlan, ProvisionStep, StepOutcome};
use crate::sql::split_statements;
use crate::target::{ConnectParams, Connector, SqlSession};
use crate::transform::{transform_rows, SchemaRules, SchemaTransformer};

/// Longest statement excerpt quoted in a failure log line.
const STATEMENT_EXCERPT: usize = 160;

/// Counts for one batch of statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub attempted: usize,
    pub failed: usize,
}

impl LoadStats {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub rows: LoadStats,
}

/// What a successful job hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    pub database: String,
    pub role: String,
    pub schema: LoadStats,
    pub tables: Vec<TableReport>,
    pub log: String,
}

impl ImportResult {
    pub fn failed_statements(&self) -> usize {
        self.schema.failed + self.tables.iter().map(|t| t.rows.failed).sum::<usize>()
    }
}

pub struct Importer<X, C> {
    extractor: X,
    connector: C,
    rules: SchemaRules,
}

impl<X, C> Importer<X, C>
where
    X: Extractor,
    C: Connector,
{
    pub fn new(extractor: X, connector: C) -> Self {
        Self {
            extractor,
            connector,
            rules: SchemaRules::default(),
        }
    }

    pub fn with_rules(mut self, rules: SchemaRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn extractor(&self) -> &X {
        &self.extractor
    }

    /// Registry, schema transform and row export; writes all artifacts.
    ///
    /// Touches no database.
    pub async fn prepare(&self, job: &Job, source: &Path, working_dir: &Path) -> Result<Artifacts, ImportError> {
        let is_file = tokio::fs::metadata(source)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(ImportError::SourceNotFound(source.to_path_buf()));
        }
        let database = naming::database_name(source)
            .ok_or_else(|| ImportError::InvalidSourceName(source.to_path_buf()))?;

        job.info(format!("Reading {}", source.display()));
        let identifiers = IdentifierSet::discover(&self.extractor, source).await?;
        let names: Vec<&str> = identifiers.table_names().collect();
        job.info(format!("Found {} tables: {}", names.len(), names.join(", ")));
        job.advance(Phase::RegistryBuilt);

        let mut writer = ArtifactWriter::create(working_dir).await?;

        job.info("Extracting schema");
        let raw = self.extractor.schema_dump(source).await?;
        let document = SchemaTransformer::new(&identifiers, &self.rules).transform(&raw);
        let schema = writer.write_schema(&database, &document).await?;
        job.info(format!(
            "Schema dumped to {} ({} statements, {} excluded)",
            schema.display(),
            document.len(),
            document.dropped
        ));
        job.advance(Phase::SchemaTransformed);

        let mut tables = Vec::with_capacity(names.len());
        for table in names {
            job.info(format!("Dumping {table}"));
            let raw = self.extractor.export_rows(source, table).await?;
            let statements = transform_rows(&raw);
            let artifact = writer.write_table(table, &statements).await?;
            job.info(format!(
                "{table} dumped to {} ({} rows)",
                artifact.path.display(),
                artifact.statements
            ));
            tables.push(artifact);
        }

        Ok(Artifacts {
            database,
            schema,
            schema_statements: document.len(),
            schema_dropped: document.dropped,
            tables,
        })
    }

    /// The whole pipeline. Artifacts go to `<working_dir>/<job id>/`.
    ///
    /// Does not record the outcome on `job`; see [`Importer::execute`].
    pub async fn run(&self, job: &Job, spec: &JobSpec) -> Result<ImportResult, ImportError> {
        // One subdirectory per job: several jobs may share `working_dir`.
        let working_dir = spec.working_dir.join(job.id().to_string());
        let artifacts = self.prepare(job, &spec.source, &working_dir).await?;
        let database = artifacts.database.clone();
        let role = spec
            .role
            .clone()
            .unwrap_or_else(|| naming::default_role(&database));
        let plan = ProvisionPlan::new(database.clone(), role.clone(), spec.role_password.clone());

        let server = &spec.server;
        job.info(format!(
            "Connecting to {} as {}",
            server.address(),
            server.admin_user
        ));
        let admin_params = ConnectParams {
            host: server.host.clone(),
            port: server.port,
            database: server.admin_database.clone(),
            user: server.admin_user.clone(),
            password: server.admin_password.clone(),
        };
        let mut admin = self
            .connector
            .connect(&admin_params)
            .await
            .map_err(|source| ImportError::AdminConnect {
                server: server.address(),
                user: server.admin_user.clone(),
                source,
            })?;

        let provisioned = provision(&mut admin, &plan, |step, outcome| {
            let line = plan.describe(step, outcome);
            let reused = step == ProvisionStep::CreateDatabase && *outcome == StepOutcome::AlreadyExists;
            if outcome.is_failure() || reused {
                job.warn(line);
            } else {
                job.info(line);
            }
        })
        .await;
        if let Err(err) = admin.close().await {
            debug!(job = %job.id(), error = %err, "closing admin session");
        }
        let report = provisioned.map_err(|source| ImportError::ConnectionLost {
            phase: "provisioning",
            source,
        })?;
        if report.reused_database() {
            return Err(ImportError::ExistingDatabase { database });
        }
        job.advance(Phase::Provisioned);

        let role_params = ConnectParams {
            host: server.host.clone(),
            port: server.port,
            database: database.clone(),
            user: role.clone(),
            password: Some(spec.role_password.clone()),
        };
        let mut session = self
            .connector
            .connect(&role_params)
            .await
            .map_err(|source| ImportError::RoleConnect {
                database: database.clone(),
                role: role.clone(),
                source,
            })?;
        job.info(format!("Connected to {database} as {role}"));

        let text = artifacts::read(&artifacts.schema).await?;
        let schema = load(job, &mut session, &text, "loading schema").await?;
        job.info(format!(
            "Imported database schema ({}/{} statements)",
            schema.succeeded(),
            schema.attempted
        ));
        job.advance(Phase::SchemaLoaded);

        let mut tables = Vec::with_capacity(artifacts.tables.len());
        for artifact in &artifacts.tables {
            let text = artifacts::read(&artifact.path).await?;
            let rows = load(job, &mut session, &text, "loading rows").await?;
            job.info(format!(
                "Imported {} ({}/{} rows)",
                artifact.table,
                rows.succeeded(),
                rows.attempted
            ));
            tables.push(TableReport {
                table: artifact.table.clone(),
                rows,
            });
        }
        job.advance(Phase::RowsLoaded);

        if let Err(err) = session.close().await {
            debug!(job = %job.id(), error = %err, "closing role session");
        }

        let result = ImportResult {
            database,
            role,
            schema,
            tables,
            log: String::new(),
        };
        let failed = result.failed_statements();
        if failed > 0 {
            job.warn(format!("Import finished with {failed} failed statements"));
        } else {
            job.info("Import finished");
        }
        Ok(ImportResult {
            log: job.log_text(),
            ..result
        })
    }

    /// Run the pipeline and record success or failure on `job`.
    pub async fn execute(&self, job: &Job, spec: &JobSpec) -> Result<ImportResult, ImportError> {
        match self.run(job, spec).await {
            Ok(result) => {
                job.succeed(result.clone());
                Ok(result)
            }
            Err(err) => {
                job.error(format!("Import aborted: {err}"));
                job.fail(err.to_string());
                Err(err)
            }
        }
    }
}

/// Execute every statement of `text` in order, logging and skipping failures.
async fn load<S>(job: &Job, session: &mut S, text: &str, phase: &'static str) -> Result<LoadStats, ImportError>
where
    S: SqlSession + ?Sized,
{
    let mut stats = LoadStats::default();
    for statement in split_statements(text) {
        stats.attempted += 1;
        if let Err(err) = session.execute(statement).await {
            if err.is_fatal() {
                return Err(ImportError::ConnectionLost { phase, source: err });
            }
            stats.failed += 1;
            job.error(format!("{err} in: {}", excerpt(statement)));
        }
    }
    Ok(stats)
}

fn excerpt(statement: &str) -> String {
    if statement.chars().count() <= STATEMENT_EXCERPT {
        return statement.to_string();
    }
    let mut short: String = statement.chars().take(STATEMENT_EXCERPT).collect();
    short.push_str("...");
    short
}
