//! `Extractor` over the mdbtools command-line programs.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{parse_header, parse_table_list, ExtractError, Extractor};
use crate::config::ToolsConfig;

/// Runs `mdb-tables`, `mdb-export` and `mdb-schema` as subprocesses.
#[derive(Debug, Clone, Default)]
pub struct MdbTools {
    config: ToolsConfig,
}

impl MdbTools {
    pub fn new(config: ToolsConfig) -> Self {
        Self { config }
    }

    fn command(program: &str) -> Command {
        let mut command = Command::new(program);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Run to completion and return stdout.
    async fn run(&self, program: &str, mut command: Command) -> Result<String, ExtractError> {
        debug!(tool = program, "invoking extraction tool");
        let child = command
            .spawn()
            .map_err(|source| ExtractError::ToolUnavailable {
                tool: program.to_string(),
                source,
            })?;

        let output = timeout(self.config.timeout(), child.wait_with_output())
            .await
            .map_err(|_| ExtractError::TimedOut {
                tool: program.to_string(),
                after: self.config.timeout(),
            })?
            .map_err(|source| ExtractError::Io {
                tool: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractError::ToolFailed {
                tool: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Read only the first line of stdout, then stop the process.
    async fn first_line(&self, program: &str, mut command: Command) -> Result<Option<String>, ExtractError> {
        debug!(tool = program, "reading first line from extraction tool");
        command.stderr(Stdio::null());
        let mut child = command
            .spawn()
            .map_err(|source| ExtractError::ToolUnavailable {
                tool: program.to_string(),
                source,
            })?;

        let Some(stdout) = child.stdout.take() else {
            return Ok(None);
        };
        let mut lines = BufReader::new(stdout).lines();

        let line = timeout(self.config.timeout(), lines.next_line())
            .await
            .map_err(|_| ExtractError::TimedOut {
                tool: program.to_string(),
                after: self.config.timeout(),
            })?
            .map_err(|source| ExtractError::Io {
                tool: program.to_string(),
                source,
            })?;

        // The rest of the export is not needed; the process may already be gone.
        let _ = child.kill().await;

        Ok(line)
    }
}

#[async_trait]
impl Extractor for MdbTools {
    async fn list_tables(&self, source: &Path) -> Result<Vec<String>, ExtractError> {
        let program = &self.config.mdb_tables;
        let mut command = Self::command(program);
        command.arg("-1").arg(source);
        let output = self.run(program, command).await?;
        Ok(parse_table_list(&output))
    }

    async fn table_columns(&self, source: &Path, table: &str) -> Result<Vec<String>, ExtractError> {
        let program = &self.config.mdb_export;
        let mut command = Self::command(program);
        command.arg(source).arg(table);
        let header = self.first_line(program, command).await?.ok_or_else(|| {
            ExtractError::MissingHeader {
                tool: program.to_string(),
                table: table.to_string(),
            }
        })?;
        Ok(parse_header(&header))
    }

    async fn schema_dump(&self, source: &Path) -> Result<String, ExtractError> {
        let program = &self.config.mdb_schema;
        let mut command = Self::command(program);
        command.arg(source).arg(&self.config.dialect);
        self.run(program, command).await
    }

    async fn export_rows(&self, source: &Path, table: &str) -> Result<String, ExtractError> {
        let program = &self.config.mdb_export;
        let mut command = Self::command(program);
        command
            .arg("-I")
            .arg(&self.config.dialect)
            .arg("-q")
            .arg(&self.config.quote_char)
            .arg(source)
            .arg(table);
        self.run(program, command).await
    }
}
