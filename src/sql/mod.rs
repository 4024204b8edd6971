//! SQL text handling shared by the transformers and the loaders.
//!
//! - `lexer`: nom tokenizer and statement splitter
//! - `quote`: identifier and literal quoting for generated DDL

mod lexer;
mod quote;

pub use lexer::{split_statements, tokenize, Lexer, Token};
pub use quote::{quote_ident, quote_literal};

pub(crate) use lexer::{bare_word, quoted_identifier};
