//! # pglens-guard
//!
//! Decides whether a piece of SQL is safe to run on a read-only connection.
//!
//! The decision is a pure function of the input text: no database access,
//! no configuration. Matching is done on tokens produced by `sqlparser`'s
//! Postgres tokenizer, so literals, quoted identifiers and comments can never
//! trigger (or hide) a blocked keyword.
//!
//! ```
//! use pglens_guard::validate;
//!
//! assert!(validate("SELECT deleted_at FROM t WHERE note = 'DELETE me'").is_ok());
//! assert!(validate("SELECT 1; DROP TABLE t").is_err());
//! ```

pub mod error;
pub mod lexer;
pub mod validator;

pub use error::GuardError;
pub use lexer::{Lexeme, LexemeKind, lex};
pub use validator::{AcceptedQuery, BLOCKED_KEYWORDS, StatementKind, validate, validate_fragment};
