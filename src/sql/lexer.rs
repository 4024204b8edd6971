//! SQL tokenizer.
//!
//! Splits SQL text into a flat stream of tokens without validating it. The
//! lexer never fails: anything it does not recognise becomes a one-character
//! [`Token::Punct`], so concatenating the text of every token reproduces the
//! input byte for byte.

use std::borrow::Cow;

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_until, take_while1},
    character::complete::{anychar, char, multispace1, not_line_ending},
    combinator::{map, recognize},
    multi::many0,
    sequence::{delimited, pair},
    IResult,
};

/// A lexical token borrowing its text from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Bare keyword, identifier or number.
    Word(&'a str),
    /// Double-quoted identifier, quotes included.
    QuotedIdent(&'a str),
    /// Single-quoted string literal, quotes included.
    Literal(&'a str),
    /// `-- line` or `/* block */` comment.
    Comment(&'a str),
    Whitespace(&'a str),
    /// Any other single character.
    Punct(&'a str),
}

impl<'a> Token<'a> {
    /// Raw source text of the token.
    pub fn text(&self) -> &'a str {
        match *self {
            Token::Word(s)
            | Token::QuotedIdent(s)
            | Token::Literal(s)
            | Token::Comment(s)
            | Token::Whitespace(s)
            | Token::Punct(s) => s,
        }
    }

    /// Whitespace and comments.
    pub fn is_trivia(&self) -> bool {
        matches!(self, Token::Whitespace(_) | Token::Comment(_))
    }

    /// Name of a word or quoted identifier, with quotes and `""` escapes removed.
    pub fn identifier(&self) -> Option<Cow<'a, str>> {
        match *self {
            Token::Word(w) => Some(Cow::Borrowed(w)),
            Token::QuotedIdent(q) => {
                let inner = &q[1..q.len() - 1];
                if inner.contains("\"\"") {
                    Some(Cow::Owned(inner.replace("\"\"", "\"")))
                } else {
                    Some(Cow::Borrowed(inner))
                }
            }
            _ => None,
        }
    }

    /// True for a bare word equal to `keyword`, ignoring ASCII case.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Parse a double-quoted identifier, returning it with its quotes.
pub(crate) fn quoted_identifier(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('"'),
        many0(alt((tag("\"\""), is_not("\"")))),
        char('"'),
    ))(input)
}

/// Parse a bare identifier or keyword.
pub(crate) fn bare_word(input: &str) -> IResult<&str, &str> {
    take_while1(is_word_char)(input)
}

fn string_literal(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('\''),
        many0(alt((tag("''"), is_not("'")))),
        char('\''),
    ))(input)
}

fn comment(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(pair(tag("--"), not_line_ending)),
        recognize(delimited(tag("/*"), take_until("*/"), tag("*/"))),
    ))(input)
}

fn token(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        map(multispace1, Token::Whitespace),
        map(comment, Token::Comment),
        map(quoted_identifier, Token::QuotedIdent),
        map(string_literal, Token::Literal),
        map(bare_word, Token::Word),
        map(recognize(anychar), Token::Punct),
    ))(input)
}

/// Streaming tokenizer over a borrowed string.
pub struct Lexer<'a> {
    rest: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { rest: input }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if self.rest.is_empty() {
            return None;
        }
        match token(self.rest) {
            Ok((rest, tok)) => {
                self.rest = rest;
                Some(tok)
            }
            // anychar accepts any non-empty input, so this only guards the invariant
            Err(_) => {
                let tail = self.rest;
                self.rest = "";
                Some(Token::Punct(tail))
            }
        }
    }
}

/// Tokenize a whole string.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input).collect()
}

/// Split SQL text into statements terminated by `;` outside quotes and comments.
///
/// Leading and trailing whitespace/comments are not part of a statement. A
/// final statement without a terminator is still returned; empty statements
/// (a lone `;`) are skipped.
pub fn split_statements(input: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;
    let mut offset = 0;

    for tok in Lexer::new(input) {
        let len = tok.text().len();
        if !tok.is_trivia() {
            if start.is_none() {
                start = Some(offset);
            }
            end = offset + len;
        }
        if tok == Token::Punct(";") {
            if let Some(begin) = start.take() {
                if end - begin > 1 {
                    statements.push(&input[begin..end]);
                }
            }
        }
        offset += len;
    }

    if let Some(begin) = start {
        statements.push(&input[begin..end]);
    }
    statements
}
