//! On-disk artifacts of a job.
//!
//! One schema file and one file per table, written into the job's working
//! directory before anything touches the server and left behind afterwards.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::ImportError;
use crate::naming;
use crate::transform::SchemaDocument;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableArtifact {
    /// Table name as the source reports it.
    pub table: String,
    pub path: PathBuf,
    pub statements: usize,
}

/// Everything `Importer::prepare` produced for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifacts {
    pub database: String,
    pub schema: PathBuf,
    pub schema_statements: usize,
    /// Statements removed by the exclusion rules.
    pub schema_dropped: usize,
    pub tables: Vec<TableArtifact>,
}

/// Hands out artifact paths inside one directory and writes them.
#[derive(Debug)]
pub struct ArtifactWriter {
    dir: PathBuf,
    taken: HashSet<String>,
}

impl ArtifactWriter {
    pub async fn create(dir: &Path) -> Result<Self, ImportError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| ImportError::Artifact {
                path: dir.to_path_buf(),
                source,
            })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            taken: HashSet::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve `file_name`, appending `_2`, `_3`, ... to its stem if two
    /// tables sanitize to the same name.
    fn reserve(&mut self, file_name: String) -> PathBuf {
        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
            None => (file_name.clone(), String::new()),
        };
        let mut candidate = file_name;
        let mut n = 2;
        while !self.taken.insert(candidate.clone()) {
            candidate = format!("{stem}_{n}{ext}");
            n += 1;
        }
        self.dir.join(candidate)
    }

    async fn write(&self, path: &Path, contents: String) -> Result<(), ImportError> {
        tokio::fs::write(path, contents)
            .await
            .map_err(|source| ImportError::Artifact {
                path: path.to_path_buf(),
                source,
            })
    }

    pub async fn write_schema(
        &mut self,
        database: &str,
        document: &SchemaDocument,
    ) -> Result<PathBuf, ImportError> {
        let path = self.reserve(naming::schema_file_name(database));
        self.write(&path, document.render()).await?;
        Ok(path)
    }

    /// One statement per line, newline terminated.
    pub async fn write_table(
        &mut self,
        table: &str,
        statements: &[String],
    ) -> Result<TableArtifact, ImportError> {
        let path = self.reserve(naming::table_file_name(table));
        let mut contents = String::new();
        for statement in statements {
            contents.push_str(statement);
            contents.push('\n');
        }
        self.write(&path, contents).await?;
        Ok(TableArtifact {
            table: table.to_string(),
            path,
            statements: statements.len(),
        })
    }
}

/// Read an artifact back for loading.
pub async fn read(path: &Path) -> Result<String, ImportError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ImportError::Artifact {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_colliding_table_names_get_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ArtifactWriter::create(dir.path()).await.unwrap();

        let a = writer.write_table("Order Details", &[]).await.unwrap();
        let b = writer.write_table("Order-Details", &[]).await.unwrap();
        let c = writer.write_table("order_details", &[]).await.unwrap();

        assert_eq!(a.path.file_name().unwrap(), "table_order_details.sql");
        assert_eq!(b.path.file_name().unwrap(), "table_order_details_2.sql");
        assert_eq!(c.path.file_name().unwrap(), "table_order_details_3.sql");
    }

    #[tokio::test]
    async fn test_table_artifact_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ArtifactWriter::create(&dir.path().join("nested")).await.unwrap();
        let statements = vec![
            "insert into \"t\" (\"a\") VALUES (1);".to_string(),
            "insert into \"t\" (\"a\") VALUES (2);".to_string(),
        ];

        let artifact = writer.write_table("T", &statements).await.unwrap();
        assert_eq!(artifact.statements, 2);
        assert_eq!(
            read(&artifact.path).await.unwrap(),
            "insert into \"t\" (\"a\") VALUES (1);\ninsert into \"t\" (\"a\") VALUES (2);\n"
        );
    }

    #[tokio::test]
    async fn test_read_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = read(&dir.path().join("absent.sql")).await.unwrap_err();
        assert!(matches!(err, ImportError::Artifact { .. }));
    }
}
