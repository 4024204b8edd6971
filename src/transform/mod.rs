//! Rewrites of extracted SQL into PostgreSQL-ready text.
//!
//! - `schema`: token-level identifier folding, type rewrites, constraint
//!   stripping and statement exclusion for the DDL dump
//! - `rows`: structural folding of the table/column clause of `INSERT`s

mod rows;
mod schema;

pub use rows::{fold_insert, transform_rows};
pub use schema::{SchemaDocument, SchemaRules, SchemaTransformer};
