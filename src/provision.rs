//! Target database provisioning.
//!
//! Four steps in fixed order over an administrator session:
//!
//! 1. rename an existing database of the same name out of the way,
//! 2. create the owning role, or update its password if it exists,
//! 3. create the database owned by that role,
//! 4. grant the role all privileges on it.
//!
//! Every step yields a [`StepOutcome`]. Server-side refusals are outcomes,
//! not errors: the next step still runs. Only a lost or refused connection
//! ends provisioning early.

use std::fmt;

use chrono::{DateTime, Local};

use crate::naming;
use crate::sql::{quote_ident, quote_literal};
use crate::target::{SqlError, SqlSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    BackupExisting,
    Role,
    CreateDatabase,
    Grant,
}

impl ProvisionStep {
    pub const ALL: [ProvisionStep; 4] = [
        ProvisionStep::BackupExisting,
        ProvisionStep::Role,
        ProvisionStep::CreateDatabase,
        ProvisionStep::Grant,
    ];
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisionStep::BackupExisting => "backup existing database",
            ProvisionStep::Role => "create role",
            ProvisionStep::CreateDatabase => "create database",
            ProvisionStep::Grant => "grant privileges",
        };
        f.write_str(name)
    }
}

/// Result of one provisioning step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    /// The object existed; for the role this means its password was updated.
    AlreadyExists,
    /// Nothing to do (no database to back up).
    NotPresent,
    Failed(SqlError),
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

/// Desired end state on the server.
#[derive(Clone)]
pub struct ProvisionPlan {
    pub database: String,
    pub role: String,
    pub password: String,
    /// Name an existing `database` is renamed to.
    pub backup: String,
}

impl fmt::Debug for ProvisionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionPlan")
            .field("database", &self.database)
            .field("role", &self.role)
            .field("password", &"***")
            .field("backup", &self.backup)
            .finish()
    }
}

impl ProvisionPlan {
    pub fn new(database: impl Into<String>, role: impl Into<String>, password: impl Into<String>) -> Self {
        Self::at(database, role, password, &Local::now())
    }

    /// Plan whose backup name is stamped with `at`.
    pub fn at(
        database: impl Into<String>,
        role: impl Into<String>,
        password: impl Into<String>,
        at: &DateTime<Local>,
    ) -> Self {
        let database = database.into();
        let backup = naming::backup_name(&database, at);
        Self {
            database,
            role: role.into(),
            password: password.into(),
            backup,
        }
    }

    fn rename_sql(&self) -> String {
        format!(
            "ALTER DATABASE {} RENAME TO {}",
            quote_ident(&self.database),
            quote_ident(&self.backup)
        )
    }

    fn create_role_sql(&self) -> String {
        format!(
            "CREATE ROLE {} WITH LOGIN PASSWORD {}",
            quote_ident(&self.role),
            quote_literal(&self.password)
        )
    }

    fn alter_role_sql(&self) -> String {
        format!(
            "ALTER ROLE {} WITH LOGIN PASSWORD {}",
            quote_ident(&self.role),
            quote_literal(&self.password)
        )
    }

    fn create_database_sql(&self) -> String {
        format!(
            "CREATE DATABASE {} OWNER {}",
            quote_ident(&self.database),
            quote_ident(&self.role)
        )
    }

    fn grant_sql(&self) -> String {
        format!(
            "GRANT ALL PRIVILEGES ON DATABASE {} TO {}",
            quote_ident(&self.database),
            quote_ident(&self.role)
        )
    }

    /// Log line for a step result. Never contains the password.
    pub fn describe(&self, step: ProvisionStep, outcome: &StepOutcome) -> String {
        let (db, role) = (&self.database, &self.role);
        match (step, outcome) {
            (_, StepOutcome::Failed(err)) => format!("Failed to {step}: {err}"),
            (ProvisionStep::BackupExisting, StepOutcome::NotPresent) => {
                format!("Database {db} not present, nothing to back up")
            }
            (ProvisionStep::BackupExisting, _) => {
                format!("Renamed existing database {db} to {}", self.backup)
            }
            (ProvisionStep::Role, StepOutcome::AlreadyExists) => {
                format!("Role {role} already exists, updated its password")
            }
            (ProvisionStep::Role, _) => format!("Created role {role}"),
            (ProvisionStep::CreateDatabase, StepOutcome::AlreadyExists) => {
                format!("Database {db} already exists and was not backed up")
            }
            (ProvisionStep::CreateDatabase, _) => {
                format!("Created database {db} with owner {role}")
            }
            (ProvisionStep::Grant, _) => {
                format!("Granted all privileges on database {db} to {role}")
            }
        }
    }
}

/// Outcomes of a provisioning run, in step order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub steps: Vec<(ProvisionStep, StepOutcome)>,
}

impl ProvisionReport {
    pub fn outcome(&self, step: ProvisionStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|(_, o)| o.is_failure()).count()
    }

    /// True when the target database was left over from before this run:
    /// the rename did not move it aside, so `CREATE DATABASE` found it.
    pub fn reused_database(&self) -> bool {
        self.outcome(ProvisionStep::CreateDatabase) == Some(&StepOutcome::AlreadyExists)
    }
}

/// Turn a statement result into an outcome, or stop on a fatal error.
fn settle(
    result: Result<(), SqlError>,
    on_error: impl FnOnce(SqlError) -> StepOutcome,
) -> Result<StepOutcome, SqlError> {
    match result {
        Ok(()) => Ok(StepOutcome::Applied),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => Ok(on_error(err)),
    }
}

async fn role_step<S>(session: &mut S, plan: &ProvisionPlan) -> Result<StepOutcome, SqlError>
where
    S: SqlSession + ?Sized,
{
    match session.execute(&plan.create_role_sql()).await {
        Ok(()) => Ok(StepOutcome::Applied),
        Err(SqlError::DuplicateObject { .. }) => {
            match session.execute(&plan.alter_role_sql()).await {
                Ok(()) => Ok(StepOutcome::AlreadyExists),
                Err(err) => settle(Err(err), StepOutcome::Failed),
            }
        }
        Err(err) => settle(Err(err), StepOutcome::Failed),
    }
}

/// Bring the server to the state described by `plan`.
///
/// `observe` sees each step as soon as it settles. Returns `Err` only for a
/// fatal (connection) error, in which case later steps were not attempted.
pub async fn provision<S, F>(
    session: &mut S,
    plan: &ProvisionPlan,
    mut observe: F,
) -> Result<ProvisionReport, SqlError>
where
    S: SqlSession + ?Sized,
    F: FnMut(ProvisionStep, &StepOutcome) + Send,
{
    let mut report = ProvisionReport::default();

    for step in ProvisionStep::ALL {
        let outcome = match step {
            ProvisionStep::BackupExisting => {
                let renamed = session.execute(&plan.rename_sql()).await;
                settle(renamed, |err| match err {
                    SqlError::UndefinedObject { .. } => StepOutcome::NotPresent,
                    other => StepOutcome::Failed(other),
                })?
            }
            ProvisionStep::Role => role_step(session, plan).await?,
            ProvisionStep::CreateDatabase => {
                let created = session.execute(&plan.create_database_sql()).await;
                settle(created, |err| match err {
                    SqlError::DuplicateObject { .. } => StepOutcome::AlreadyExists,
                    other => StepOutcome::Failed(other),
                })?
            }
            ProvisionStep::Grant => {
                let granted = session.execute(&plan.grant_sql()).await;
                settle(granted, StepOutcome::Failed)?
            }
        };
        observe(step, &outcome);
        report.steps.push((step, outcome));
    }

    Ok(report)
}
