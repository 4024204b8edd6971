//! Quoting for SQL text that cannot use bind parameters.
//!
//! `CREATE ROLE ... PASSWORD` and database names in `CREATE DATABASE` are
//! utility statements, so their values have to be spliced into the text.

/// Quote an identifier: `Sales "Q1"` → `"Sales ""Q1"""`.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal: `it's` → `'it''s'`.
///
/// Assumes `standard_conforming_strings = on` (the server default since 9.1),
/// so backslashes are not escapes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("sales"), "\"sales\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("secret"), "'secret'");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal("back\\slash"), "'back\\slash'");
    }
}
