//! Read-only statement classification.
//!
//! [`validate`] admits a statement only when all of the following hold:
//!
//! 1. it tokenizes and its parentheses balance,
//! 2. it is a single statement (trailing semicolons are fine),
//! 3. it starts with `SELECT`, or with `WITH` whose CTE list is followed by
//!    a `SELECT`,
//! 4. no unquoted word anywhere in it is a blocked keyword.
//!
//! Keyword checks run on tokens, never on raw text, so a blocked word inside
//! a string, a quoted identifier or a comment is ignored, and so is an
//! identifier that merely contains one (`deleted_at`).

use crate::error::GuardError;
use crate::lexer::{Lexeme, LexemeKind, lex};
use serde::Serialize;
use std::collections::BTreeSet;

/// Keywords that must never appear as bare words in an admitted statement.
pub const BLOCKED_KEYWORDS: &[&str] = &[
    // data modification
    "INSERT", "UPDATE", "DELETE", "UPSERT", "MERGE",
    // schema modification
    "CREATE", "ALTER", "DROP", "TRUNCATE", "RENAME",
    // permissions
    "GRANT", "REVOKE",
    // session state
    "SET", "RESET", "DISCARD",
    // maintenance
    "VACUUM", "ANALYZE", "CLUSTER", "REINDEX", "COPY",
    // transaction control
    "BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT",
];

/// `SELECT ... INTO t` creates a table, so INTO is refused the same way.
const WRITE_CLAUSES: &[&str] = &["INTO"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    With,
}

/// An admitted statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptedQuery {
    /// Input with surrounding whitespace and trailing semicolons removed.
    pub sql: String,
    pub kind: StatementKind,
    /// Highest `$N` placeholder index, 0 when there are none.
    pub placeholder_count: usize,
    #[serde(skip)]
    placeholders: BTreeSet<usize>,
}

impl AcceptedQuery {
    /// Check that placeholders are exactly `$1..$N` and that `supplied`
    /// parameters were given for them.
    pub fn check_parameters(&self, supplied: usize) -> Result<(), GuardError> {
        if let Some(missing) = (1..=self.placeholder_count).find(|i| !self.placeholders.contains(i)) {
            return Err(GuardError::Parameter {
                reason: format!(
                    "placeholders must be numbered $1..${} without gaps; ${} is missing",
                    self.placeholder_count, missing
                ),
            });
        }
        if supplied != self.placeholder_count {
            return Err(GuardError::Parameter {
                reason: format!(
                    "query uses {} placeholder(s) but {} parameter(s) were supplied",
                    self.placeholder_count, supplied
                ),
            });
        }
        Ok(())
    }
}

/// Classify `sql` as an admissible read-only statement.
pub fn validate(sql: &str) -> Result<AcceptedQuery, GuardError> {
    let lexed = lex(sql)?;
    let lexemes = &lexed.lexemes;

    let Some(first) = lexemes.first() else {
        return Err(GuardError::malformed("empty statement", None));
    };

    check_balance(lexemes)?;
    let end = statement_end(lexemes)?;
    let statement = &lexemes[..end];

    if first.kind == LexemeKind::Word && is_blocked(&first.text) {
        return Err(write_denied(first));
    }
    let kind = if first.is_word("SELECT") {
        StatementKind::Select
    } else if first.is_word("WITH") {
        StatementKind::With
    } else {
        return Err(GuardError::NotSelect {
            found: first.text.clone(),
        });
    };

    scan_blocked(statement)?;

    if kind == StatementKind::With {
        let main = skip_ctes(statement)?;
        if !main.is_word("SELECT") {
            return Err(GuardError::NotSelect {
                found: format!("WITH ... {}", main.text),
            });
        }
    }

    let placeholders = collect_placeholders(statement)?;
    let normalized = match lexemes.get(end) {
        Some(semicolon) => &sql[..semicolon.offset],
        None => sql,
    };

    tracing::debug!(kind = ?kind, tokens = statement.len(), "statement admitted");

    Ok(AcceptedQuery {
        sql: normalized.trim().to_string(),
        kind,
        placeholder_count: placeholders.iter().next_back().copied().unwrap_or(0),
        placeholders,
    })
}

/// Validate a bare predicate (the body of a WHERE clause) that will be
/// spliced into a generated query.
///
/// Fragments get the same keyword scan as full statements and, in addition,
/// may not contain semicolons, comments, placeholders, or a closing
/// parenthesis that escapes the fragment. A leading `WHERE` is dropped.
pub fn validate_fragment(fragment: &str) -> Result<String, GuardError> {
    let lexed = lex(fragment)?;
    if lexed.has_comments {
        return Err(GuardError::malformed("comments are not allowed in a predicate", None));
    }

    let mut lexemes = lexed.lexemes.as_slice();
    let mut body = fragment;
    if let Some(first) = lexemes.first()
        && first.is_word("WHERE")
    {
        body = lexemes
            .get(1)
            .map(|next| &fragment[next.offset..])
            .unwrap_or("");
        lexemes = &lexemes[1..];
    }
    if lexemes.is_empty() {
        return Err(GuardError::malformed("empty predicate", None));
    }

    if let Some(semicolon) = lexemes.iter().find(|l| l.kind == LexemeKind::Semicolon) {
        return Err(GuardError::malformed(
            "semicolons are not allowed in a predicate",
            Some(semicolon.offset),
        ));
    }
    if let Some(placeholder) = lexemes.iter().find(|l| l.kind == LexemeKind::Placeholder) {
        return Err(GuardError::Parameter {
            reason: format!("placeholder {} is not supported in a predicate", placeholder.text),
        });
    }
    check_balance(lexemes)?;
    scan_blocked(lexemes)?;

    Ok(body.trim().to_string())
}

fn is_blocked(word: &str) -> bool {
    BLOCKED_KEYWORDS
        .iter()
        .chain(WRITE_CLAUSES)
        .any(|k| k.eq_ignore_ascii_case(word))
}

fn write_denied(lexeme: &Lexeme) -> GuardError {
    GuardError::WriteDenied {
        keyword: lexeme.text.to_ascii_uppercase(),
        position: lexeme.position,
        offset: lexeme.offset,
    }
}

fn check_balance(lexemes: &[Lexeme]) -> Result<(), GuardError> {
    let mut depth = 0usize;
    for l in lexemes {
        match l.kind {
            LexemeKind::LParen => depth += 1,
            LexemeKind::RParen => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    GuardError::malformed("unbalanced parentheses: unexpected ')'", Some(l.offset))
                })?;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(GuardError::malformed(
            format!("unbalanced parentheses: {} unclosed '('", depth),
            None,
        ));
    }
    Ok(())
}

/// Index one past the statement: the first semicolon, or the end of input.
/// Anything but more semicolons after it means a second statement.
fn statement_end(lexemes: &[Lexeme]) -> Result<usize, GuardError> {
    let Some(end) = lexemes.iter().position(|l| l.kind == LexemeKind::Semicolon) else {
        return Ok(lexemes.len());
    };
    if let Some(extra) = lexemes[end..].iter().find(|l| l.kind != LexemeKind::Semicolon) {
        return Err(GuardError::Stacked {
            offset: extra.offset,
        });
    }
    if end == 0 {
        return Err(GuardError::malformed("empty statement", None));
    }
    Ok(end)
}

fn scan_blocked(lexemes: &[Lexeme]) -> Result<(), GuardError> {
    let mut prev: Option<&Lexeme> = None;
    for l in lexemes {
        // `t.update` names a column, not a command.
        let qualified = prev.is_some_and(|p| p.kind == LexemeKind::Period);
        if l.kind == LexemeKind::Word && !qualified && is_blocked(&l.text) {
            return Err(write_denied(l));
        }
        prev = Some(l);
    }
    Ok(())
}

/// Walk `WITH [RECURSIVE] name [(cols)] AS [[NOT] MATERIALIZED] (body), ...`
/// and return the first token of the main statement, looking through any
/// opening parentheses around it.
fn skip_ctes(lexemes: &[Lexeme]) -> Result<&Lexeme, GuardError> {
    let malformed = |at: Option<&Lexeme>, what: &str| {
        GuardError::malformed(format!("malformed WITH clause: expected {}", what), at.map(|l| l.offset))
    };

    let mut i = 1;
    if lexemes.get(i).is_some_and(|l| l.is_word("RECURSIVE")) {
        i += 1;
    }

    loop {
        match lexemes.get(i) {
            Some(l) if matches!(l.kind, LexemeKind::Word | LexemeKind::QuotedIdentifier) => i += 1,
            other => return Err(malformed(other, "a CTE name")),
        }
        if lexemes.get(i).is_some_and(|l| l.kind == LexemeKind::LParen) {
            i = matching_paren(lexemes, i) + 1;
        }
        match lexemes.get(i) {
            Some(l) if l.is_word("AS") => i += 1,
            other => return Err(malformed(other, "AS")),
        }
        if lexemes.get(i).is_some_and(|l| l.is_word("NOT")) {
            i += 1;
        }
        if lexemes.get(i).is_some_and(|l| l.is_word("MATERIALIZED")) {
            i += 1;
        }
        match lexemes.get(i) {
            Some(l) if l.kind == LexemeKind::LParen => i = matching_paren(lexemes, i) + 1,
            other => return Err(malformed(other, "a parenthesized CTE body")),
        }
        if lexemes.get(i).is_some_and(|l| l.kind == LexemeKind::Comma) {
            i += 1;
            continue;
        }
        break;
    }

    while lexemes.get(i).is_some_and(|l| l.kind == LexemeKind::LParen) {
        i += 1;
    }
    lexemes
        .get(i)
        .ok_or_else(|| malformed(None, "a statement after the WITH clause"))
}

/// Index of the `)` closing the `(` at `open`. Balance has already been
/// checked, so one always exists.
fn matching_paren(lexemes: &[Lexeme], open: usize) -> usize {
    let mut depth = 0usize;
    for (i, l) in lexemes.iter().enumerate().skip(open) {
        match l.kind {
            LexemeKind::LParen => depth += 1,
            LexemeKind::RParen => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
    }
    lexemes.len()
}

fn collect_placeholders(lexemes: &[Lexeme]) -> Result<BTreeSet<usize>, GuardError> {
    let mut found = BTreeSet::new();
    for l in lexemes.iter().filter(|l| l.kind == LexemeKind::Placeholder) {
        let index = l
            .text
            .strip_prefix('$')
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n >= 1)
            .ok_or_else(|| GuardError::Parameter {
                reason: format!("unsupported placeholder {}; use $1, $2, ...", l.text),
            })?;
        found.insert(index);
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pglens_core::ErrorCode;
    use pretty_assertions::assert_eq;

    fn code(sql: &str) -> ErrorCode {
        validate(sql).unwrap_err().code()
    }

    #[test]
    fn test_accepts_plain_select() {
        let accepted = validate("  SELECT id, name FROM users WHERE id = 1  ").unwrap();
        assert_eq!(accepted.kind, StatementKind::Select);
        assert_eq!(accepted.sql, "SELECT id, name FROM users WHERE id = 1");
        assert_eq!(accepted.placeholder_count, 0);
    }

    #[test]
    fn test_accepts_lowercase_and_leading_comment() {
        assert!(validate("-- report\nselect 1").is_ok());
        assert!(validate("/* header */ SELECT 1").is_ok());
    }

    #[test]
    fn test_strips_trailing_semicolons() {
        let accepted = validate("SELECT 1;;  -- done\n").unwrap();
        assert_eq!(accepted.sql, "SELECT 1");
    }

    #[test]
    fn test_rejects_stacked_statements() {
        assert_eq!(code("SELECT 1; DROP TABLE x;"), ErrorCode::InvalidSql);
        assert_eq!(code("SELECT 1; SELECT 2"), ErrorCode::InvalidSql);
        assert!(matches!(
            validate("SELECT 1; SELECT 2"),
            Err(GuardError::Stacked { offset: 10 })
        ));
    }

    #[test]
    fn test_keyword_inside_string_literal_is_ignored() {
        assert!(validate("SELECT * FROM t WHERE note = 'please DELETE this'").is_ok());
        assert!(validate("SELECT $$DROP TABLE users$$").is_ok());
        assert!(validate("SELECT E'it''s an UPDATE'").is_ok());
    }

    #[test]
    fn test_keyword_inside_quoted_identifier_or_comment_is_ignored() {
        assert!(validate("SELECT \"update\" FROM t").is_ok());
        assert!(validate("SELECT 1 /* DELETE FROM t */").is_ok());
    }

    #[test]
    fn test_identifier_containing_keyword_is_accepted() {
        assert!(validate("SELECT deleted_at FROM t").is_ok());
        assert!(validate("SELECT created_by, updated_at, reset_token FROM t").is_ok());
        assert!(validate("SELECT t.set FROM settings t").is_ok());
    }

    #[test]
    fn test_leading_blocked_keyword_is_write_denied() {
        for keyword in BLOCKED_KEYWORDS {
            let sql = format!("{} something", keyword.to_lowercase());
            assert_eq!(code(&sql), ErrorCode::WriteOperationDenied, "{}", sql);
        }
    }

    #[test]
    fn test_other_leading_keyword_is_invalid() {
        assert_eq!(code("EXECUTE my_function()"), ErrorCode::InvalidSql);
        assert_eq!(code("EXPLAIN SELECT 1"), ErrorCode::InvalidSql);
        assert_eq!(code("VALUES (1)"), ErrorCode::InvalidSql);
    }

    #[test]
    fn test_blocked_keyword_in_subquery() {
        let err = validate("SELECT * FROM (DELETE FROM users RETURNING *) AS x").unwrap_err();
        assert_eq!(
            err,
            GuardError::WriteDenied {
                keyword: "DELETE".to_string(),
                position: 4,
                offset: 15,
            }
        );
    }

    #[test]
    fn test_blocked_keyword_in_cte_body() {
        assert_eq!(
            code("WITH deleted AS (DELETE FROM users RETURNING *) SELECT * FROM deleted"),
            ErrorCode::WriteOperationDenied
        );
    }

    #[test]
    fn test_select_into_is_denied() {
        assert_eq!(code("SELECT * INTO backup FROM users"), ErrorCode::WriteOperationDenied);
    }

    #[test]
    fn test_row_locking_is_denied() {
        assert_eq!(code("SELECT * FROM users FOR UPDATE"), ErrorCode::WriteOperationDenied);
    }

    #[test]
    fn test_with_chains() {
        let accepted = validate(
            "WITH RECURSIVE tree (id, parent) AS (SELECT id, parent FROM nodes), \
             leaves AS MATERIALIZED (SELECT * FROM tree) SELECT * FROM leaves",
        )
        .unwrap();
        assert_eq!(accepted.kind, StatementKind::With);
        assert!(validate("with a as (select 1) (select * from a)").is_ok());
    }

    #[test]
    fn test_with_must_end_in_select() {
        assert_eq!(code("WITH a AS (SELECT 1) VALUES (1)"), ErrorCode::InvalidSql);
        assert_eq!(code("WITH a AS SELECT 1"), ErrorCode::InvalidSql);
        assert_eq!(code("WITH a AS (SELECT 1)"), ErrorCode::InvalidSql);
    }

    #[test]
    fn test_malformed_input() {
        assert_eq!(code(""), ErrorCode::InvalidSql);
        assert_eq!(code("   ;"), ErrorCode::InvalidSql);
        assert_eq!(code("SELECT 'unterminated"), ErrorCode::InvalidSql);
        assert_eq!(code("SELECT (1"), ErrorCode::InvalidSql);
        assert_eq!(code("SELECT 1)"), ErrorCode::InvalidSql);
    }

    #[test]
    fn test_placeholders() {
        let accepted = validate("SELECT * FROM t WHERE a = $2 OR b = $1 OR c = $1").unwrap();
        assert_eq!(accepted.placeholder_count, 2);
        assert!(accepted.check_parameters(2).is_ok());
        assert!(matches!(
            accepted.check_parameters(1),
            Err(GuardError::Parameter { .. })
        ));
    }

    #[test]
    fn test_placeholder_gap_is_parameter_error() {
        let accepted = validate("SELECT * FROM t WHERE a = $1 AND b = $3").unwrap();
        let err = accepted.check_parameters(3).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParameterError);
    }

    #[test]
    fn test_zero_placeholder_is_parameter_error() {
        assert_eq!(code("SELECT $0"), ErrorCode::ParameterError);
    }

    #[test]
    fn test_fragment_accepts_predicates() {
        assert_eq!(
            validate_fragment("status = 'active' AND (age > 18 OR vip)").unwrap(),
            "status = 'active' AND (age > 18 OR vip)"
        );
        assert_eq!(validate_fragment("WHERE id > 10").unwrap(), "id > 10");
        assert!(validate_fragment("note = 'DROP it'").is_ok());
    }

    #[test]
    fn test_fragment_rejections() {
        assert_eq!(validate_fragment("1=1; DROP TABLE t").unwrap_err().code(), ErrorCode::InvalidSql);
        assert_eq!(validate_fragment("1=1 -- x").unwrap_err().code(), ErrorCode::InvalidSql);
        assert_eq!(validate_fragment("1=1) OR (1=1").unwrap_err().code(), ErrorCode::InvalidSql);
        assert_eq!(validate_fragment("id = $1").unwrap_err().code(), ErrorCode::ParameterError);
        assert_eq!(
            validate_fragment("id IN (SELECT id FROM t FOR UPDATE)").unwrap_err().code(),
            ErrorCode::WriteOperationDenied
        );
        assert_eq!(validate_fragment("  ").unwrap_err().code(), ErrorCode::InvalidSql);
    }

    #[test]
    fn test_accepted_queries_start_with_select_or_with() {
        let inputs = [
            "SELECT 1",
            "  -- c\n WITH x AS (SELECT 1) SELECT * FROM x",
            "select now()",
            "UPDATE t SET a = 1",
            "WITH x AS (SELECT 1) DELETE FROM t",
            "(SELECT 1)",
            "SHOW search_path",
        ];
        for sql in inputs {
            if let Ok(accepted) = validate(sql) {
                let first = lex(&accepted.sql).unwrap().lexemes[0].text.to_ascii_uppercase();
                assert!(first == "SELECT" || first == "WITH", "{}", sql);
            }
        }
    }
}
