//! Fatal job outcomes.

use std::path::PathBuf;

use thiserror::Error;

use crate::extract::ExtractError;
use crate::target::SqlError;

/// Why a job could not run to the end.
///
/// Per-statement load failures are not here: they are logged and the job
/// carries on.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("cannot derive a database name from {}", .0.display())]
    InvalidSourceName(PathBuf),

    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("failed to write {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot connect to {server} as administrator {user}: {source}")]
    AdminConnect {
        server: String,
        user: String,
        #[source]
        source: SqlError,
    },

    #[error("cannot connect to database {database} as {role}: {source}")]
    RoleConnect {
        database: String,
        role: String,
        #[source]
        source: SqlError,
    },

    #[error("database {database} already exists and could not be backed up; refusing to load into it")]
    ExistingDatabase { database: String },

    #[error("connection lost while {phase}: {source}")]
    ConnectionLost {
        phase: &'static str,
        #[source]
        source: SqlError,
    },

    #[error("job registry is full ({0} running jobs)")]
    RegistryFull(usize),
}

impl ImportError {
    /// True when the failure happened before anything touched the server.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            ImportError::SourceNotFound(_)
                | ImportError::InvalidSourceName(_)
                | ImportError::Extract(_)
                | ImportError::Artifact { .. }
                | ImportError::AdminConnect { .. }
        )
    }
}
