//! Identifier registry.
//!
//! Collects the table and column names of the source file so the schema
//! transformer can fold them to lowercase. Folding is keyed on names that
//! were actually discovered here: an identifier the registry never saw is
//! left alone, so the registry must be complete before any transform runs.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::extract::{ExtractError, Extractor};

/// A source table and its columns, in source order and casing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<String>,
}

/// Known identifiers of one source file. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct IdentifierSet {
    tables: Vec<TableInfo>,
    folded: HashSet<String>,
}

impl IdentifierSet {
    pub fn new(tables: Vec<TableInfo>) -> Self {
        let folded = tables
            .iter()
            .flat_map(|t| std::iter::once(&t.name).chain(t.columns.iter()))
            .map(|name| name.to_lowercase())
            .collect();
        Self { tables, folded }
    }

    /// Ask the extractor for every table and, per table, its column header.
    pub async fn discover<X>(extractor: &X, source: &Path) -> Result<Self, ExtractError>
    where
        X: Extractor + ?Sized,
    {
        let names = extractor.list_tables(source).await?;
        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let columns = extractor.table_columns(source, &name).await?;
            debug!(table = %name, columns = columns.len(), "discovered table");
            tables.push(TableInfo { name, columns });
        }
        Ok(Self::new(tables))
    }

    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// All names to fold: every table's columns, then the table names.
    /// Duplicates are kept; folding twice is harmless.
    pub fn replacements(&self) -> Vec<&str> {
        self.tables
            .iter()
            .flat_map(|t| t.columns.iter().map(String::as_str))
            .chain(self.table_names())
            .collect()
    }

    /// Number of distinct names, ignoring case.
    pub fn len(&self) -> usize {
        self.folded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folded.is_empty()
    }

    /// Case-insensitive membership.
    pub fn is_known(&self, name: &str) -> bool {
        self.folded.contains(&name.to_lowercase())
    }

    /// Lowercase form of `name` if it is a known identifier.
    pub fn fold(&self, name: &str) -> Option<String> {
        let lower = name.to_lowercase();
        self.folded.contains(&lower).then_some(lower)
    }
}
