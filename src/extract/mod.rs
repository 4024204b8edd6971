//! Access to the legacy file through an external extraction tool.
//!
//! The tool is a black box that prints text; this module defines the four
//! calls the pipeline makes and parses the plain-text answers. `MdbTools`
//! is the production implementation over the mdbtools programs.

mod mdbtools;

pub use mdbtools::MdbTools;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::char,
    combinator::{map, opt, recognize},
    multi::{many0, separated_list0},
    sequence::delimited,
    IResult,
};
use thiserror::Error;

/// Failures invoking the extraction tool.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("extraction tool `{tool}` is not available: {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{tool}` failed ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("`{tool}` did not finish within {after:?}")]
    TimedOut { tool: String, after: Duration },
    #[error("failed to read output of `{tool}`: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{tool}` printed no column header for table {table}")]
    MissingHeader { tool: String, table: String },
}

/// The extraction contract.
///
/// Every call receives the path of the source file; implementations decide
/// on the target dialect and quoting style of the text they produce.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Table names, in the order the tool reports them.
    async fn list_tables(&self, source: &Path) -> Result<Vec<String>, ExtractError>;

    /// Column names of one table, from the export's header line.
    async fn table_columns(&self, source: &Path, table: &str) -> Result<Vec<String>, ExtractError>;

    /// DDL for the whole file in the target dialect.
    async fn schema_dump(&self, source: &Path) -> Result<String, ExtractError>;

    /// One `INSERT` statement per row of `table`.
    async fn export_rows(&self, source: &Path, table: &str) -> Result<String, ExtractError>;
}

/// Parse a newline-separated table list, dropping blank lines.
pub fn parse_table_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn quoted_field(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('"'),
            recognize(many0(alt((tag("\"\""), is_not("\""))))),
            char('"'),
        ),
        |inner: &str| inner.replace("\"\"", "\""),
    )(input)
}

fn bare_field(input: &str) -> IResult<&str, String> {
    map(opt(is_not(",")), |field: Option<&str>| {
        field.unwrap_or("").trim().to_string()
    })(input)
}

fn header_fields(input: &str) -> IResult<&str, Vec<String>> {
    separated_list0(char(','), alt((quoted_field, bare_field)))(input)
}

/// Parse a CSV header line into column names.
///
/// Fields may be wrapped in double quotes (with `""` escapes), which lets a
/// quoted name contain commas. Empty fields are dropped.
pub fn parse_header(line: &str) -> Vec<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    match header_fields(line) {
        Ok((_, fields)) => fields.into_iter().filter(|f| !f.is_empty()).collect(),
        Err(_) => Vec::new(),
    }
}
