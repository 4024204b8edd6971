//! Row statement transformer.
//!
//! Exported rows arrive as `INSERT INTO "<table>" (<columns>) VALUES ...`.
//! Only the clause before `VALUES` is folded to lowercase; value literals
//! may contain mixed-case text that must survive as-is.

use std::borrow::Cow;

use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, multispace0, multispace1},
    combinator::{peek, recognize},
    multi::separated_list1,
    sequence::{delimited, tuple},
    IResult,
};

use crate::sql::{bare_word, quoted_identifier, split_statements};

fn identifier(input: &str) -> IResult<&str, &str> {
    alt((quoted_identifier, bare_word))(input)
}

/// `INSERT INTO <table> (<col>, ...)` up to, not including, `VALUES`.
fn insert_header(input: &str) -> IResult<&str, &str> {
    let (rest, header) = recognize(tuple((
        tag_no_case("INSERT"),
        multispace1,
        tag_no_case("INTO"),
        multispace1,
        identifier,
        multispace0,
        char('('),
        separated_list1(char(','), delimited(multispace0, identifier, multispace0)),
        char(')'),
        multispace0,
    )))(input)?;
    let (rest, _) = peek(tag_no_case("VALUES"))(rest)?;
    Ok((rest, header))
}

/// Lowercase the table name and column list of one `INSERT` statement.
///
/// Statements of any other shape are returned unchanged; the database will
/// report whatever is wrong with them when they run.
pub fn fold_insert(statement: &str) -> Cow<'_, str> {
    match insert_header(statement) {
        Ok((values, header)) => {
            let mut folded = header.to_lowercase();
            folded.push_str(values);
            Cow::Owned(folded)
        }
        Err(_) => Cow::Borrowed(statement),
    }
}

/// Split an export into statements and fold each one.
///
/// Statements are split on `;` outside quotes rather than on newlines, so a
/// memo value containing line breaks stays inside its statement.
pub fn transform_rows(raw: &str) -> Vec<String> {
    split_statements(raw)
        .into_iter()
        .map(|statement| fold_insert(statement).into_owned())
        .collect()
}
