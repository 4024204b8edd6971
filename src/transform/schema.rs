//! Schema DDL transformer.
//!
//! Works on lexer tokens rather than raw substrings: only bare words and
//! quoted identifiers are candidates for folding, so string literals,
//! comments and names that merely contain a known identifier are untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identifiers::IdentifierSet;
use crate::sql::{quote_ident, split_statements, tokenize, Token};

/// What the transformer drops and rewrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaRules {
    /// Statements starting with one of these (case-sensitive) are discarded.
    pub excluded_prefixes: Vec<String>,
    /// Bare type words to replace, matched ignoring ASCII case.
    pub type_rewrites: BTreeMap<String, String>,
    /// Remove `NOT NULL` column constraints.
    pub strip_not_null: bool,
}

impl Default for SchemaRules {
    fn default() -> Self {
        Self {
            excluded_prefixes: vec![
                "ALTER TABLE".to_string(),
                "CREATE INDEX".to_string(),
                "CREATE UNIQUE INDEX".to_string(),
            ],
            type_rewrites: BTreeMap::from([
                ("BOOL".to_string(), "INTEGER".to_string()),
                ("BOOLEAN".to_string(), "INTEGER".to_string()),
            ]),
            strip_not_null: true,
        }
    }
}

/// Transformed DDL, one entry per statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDocument {
    pub statements: Vec<String>,
    /// Statements discarded by an excluded prefix.
    pub dropped: usize,
}

impl SchemaDocument {
    /// Parse a rendered document (e.g. a schema artifact) back into statements.
    pub fn parse(text: &str) -> Self {
        Self {
            statements: split_statements(text).into_iter().map(str::to_string).collect(),
            dropped: 0,
        }
    }

    /// Statements, each followed by a line terminator.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for statement in &self.statements {
            out.push_str(statement);
            out.push('\n');
        }
        out
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Applies [`SchemaRules`] and identifier folding to DDL text.
pub struct SchemaTransformer<'a> {
    identifiers: &'a IdentifierSet,
    rules: &'a SchemaRules,
}

impl<'a> SchemaTransformer<'a> {
    pub fn new(identifiers: &'a IdentifierSet, rules: &'a SchemaRules) -> Self {
        Self { identifiers, rules }
    }

    /// Transform a full DDL dump. Pure text work; never fails.
    pub fn transform(&self, raw: &str) -> SchemaDocument {
        let mut document = SchemaDocument::default();
        for statement in split_statements(raw) {
            if self.is_excluded(statement) {
                document.dropped += 1;
                continue;
            }
            document.statements.push(self.transform_statement(statement));
        }
        document
    }

    /// Whether the untransformed statement starts with an excluded prefix.
    pub fn is_excluded(&self, statement: &str) -> bool {
        self.rules
            .excluded_prefixes
            .iter()
            .any(|prefix| statement.starts_with(prefix.as_str()))
    }

    /// Fold identifiers, rewrite types and strip `NOT NULL` in one statement.
    pub fn transform_statement(&self, statement: &str) -> String {
        let tokens = tokenize(statement);
        let mut out = String::with_capacity(statement.len());
        let mut i = 0;

        while i < tokens.len() {
            if self.rules.strip_not_null {
                if let Some(null_at) = not_null_at(&tokens, i) {
                    i = null_at + 1;
                    continue;
                }
            }

            let tok = tokens[i];
            match tok {
                Token::Word(word) => {
                    if let Some(target) = self.rewrite_type(word) {
                        out.push_str(target);
                    } else if let Some(folded) = self.identifiers.fold(word) {
                        out.push_str(&folded);
                    } else {
                        out.push_str(word);
                    }
                }
                Token::QuotedIdent(raw) => {
                    match tok.identifier().and_then(|name| self.identifiers.fold(&name)) {
                        Some(folded) => out.push_str(&quote_ident(&folded)),
                        None => out.push_str(raw),
                    }
                }
                other => out.push_str(other.text()),
            }
            i += 1;
        }
        out
    }

    fn rewrite_type(&self, word: &str) -> Option<&str> {
        self.rules
            .type_rewrites
            .iter()
            .find(|(from, _)| from.eq_ignore_ascii_case(word))
            .map(|(_, to)| to.as_str())
    }
}

/// If `tokens[i]` starts a `NOT NULL` constraint, the index of its `NULL`.
///
/// `IS NOT NULL` is a predicate, not a constraint, and is left alone.
fn not_null_at(tokens: &[Token<'_>], i: usize) -> Option<usize> {
    if !tokens[i].is_keyword("NOT") {
        return None;
    }
    let previous = tokens[..i]
        .iter()
        .rev()
        .find(|t| !matches!(t, Token::Whitespace(_)));
    if previous.is_some_and(|t| t.is_keyword("IS")) {
        return None;
    }
    let j = tokens[i + 1..]
        .iter()
        .position(|t| !matches!(t, Token::Whitespace(_)))
        .map(|offset| i + 1 + offset)?;
    tokens[j].is_keyword("NULL").then_some(j)
}
