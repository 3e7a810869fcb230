//! Significant-token stream over Postgres SQL.
//!
//! Tokenizing is delegated to `sqlparser`'s Postgres dialect, which already
//! understands string literals, `E''` escapes, dollar quoting, quoted
//! identifiers and both comment styles. This module flattens its output into
//! [`Lexeme`]s: whitespace and comments are dropped, and every remaining
//! token carries its index in the stream and its byte offset in the input.

use crate::error::GuardError;
use serde::Serialize;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Location, Token, Tokenizer, Whitespace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LexemeKind {
    /// Unquoted keyword or identifier. Only these are checked against the
    /// blocked keyword set.
    Word,
    QuotedIdentifier,
    /// String, number or other literal.
    Literal,
    /// Positional parameter such as `$1`.
    Placeholder,
    Semicolon,
    LParen,
    RParen,
    Period,
    Comma,
    /// Operators and any other punctuation.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lexeme {
    pub kind: LexemeKind,
    pub text: String,
    /// Index among significant tokens.
    pub position: usize,
    /// Byte offset of the token's first character in the input.
    pub offset: usize,
}

impl Lexeme {
    /// Case-insensitive match on an unquoted word.
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == LexemeKind::Word && self.text.eq_ignore_ascii_case(word)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Lexed {
    pub lexemes: Vec<Lexeme>,
    pub has_comments: bool,
}

pub fn lex(sql: &str) -> Result<Lexed, GuardError> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize_with_location()
        .map_err(|e| GuardError::malformed(e.to_string(), None))?;

    let lines = LineIndex::new(sql);
    let mut lexed = Lexed::default();

    for spanned in tokens {
        let kind = match &spanned.token {
            Token::EOF => continue,
            Token::Whitespace(ws) => {
                if matches!(
                    ws,
                    Whitespace::SingleLineComment { .. } | Whitespace::MultiLineComment(_)
                ) {
                    lexed.has_comments = true;
                }
                continue;
            }
            Token::Word(word) if word.quote_style.is_some() => LexemeKind::QuotedIdentifier,
            Token::Word(_) => LexemeKind::Word,
            Token::Number(_, _)
            | Token::SingleQuotedString(_)
            | Token::DollarQuotedString(_)
            | Token::EscapedStringLiteral(_)
            | Token::NationalStringLiteral(_)
            | Token::HexStringLiteral(_) => LexemeKind::Literal,
            Token::Placeholder(_) => LexemeKind::Placeholder,
            Token::SemiColon => LexemeKind::Semicolon,
            Token::LParen => LexemeKind::LParen,
            Token::RParen => LexemeKind::RParen,
            Token::Period => LexemeKind::Period,
            Token::Comma => LexemeKind::Comma,
            _ => LexemeKind::Other,
        };

        let text = match &spanned.token {
            Token::Word(word) => word.value.clone(),
            other => other.to_string(),
        };

        lexed.lexemes.push(Lexeme {
            kind,
            text,
            position: lexed.lexemes.len(),
            offset: lines.byte_offset(sql, spanned.span.start),
        });
    }

    Ok(lexed)
}

/// Maps the tokenizer's 1-based line/column (in characters) to byte offsets.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(sql: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(sql.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn byte_offset(&self, sql: &str, loc: Location) -> usize {
        let line = (loc.line.max(1) - 1) as usize;
        let Some(&start) = self.starts.get(line) else {
            return sql.len();
        };
        let column = (loc.column.max(1) - 1) as usize;
        sql[start..]
            .char_indices()
            .nth(column)
            .map(|(i, _)| start + i)
            .unwrap_or(sql.len())
    }
}
