//! Error types for the guard crate.

use pglens_core::{ErrorCode, ToolError};
use thiserror::Error;

/// Reasons a statement or predicate fragment is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// Input could not be tokenized or is structurally broken.
    #[error("malformed SQL: {reason}")]
    Malformed { reason: String, offset: Option<usize> },

    /// More than one statement in a single submission.
    #[error("multiple statements are not allowed (second statement at byte {offset})")]
    Stacked { offset: usize },

    /// Statement does not start with SELECT or WITH.
    #[error("only SELECT and WITH ... SELECT statements are allowed, found {found}")]
    NotSelect { found: String },

    /// A blocked keyword appears outside any literal.
    #[error("statement contains blocked keyword {keyword} at token {position}")]
    WriteDenied {
        keyword: String,
        position: usize,
        offset: usize,
    },

    /// Placeholders do not line up with the supplied parameters.
    #[error("parameter mismatch: {reason}")]
    Parameter { reason: String },
}

impl GuardError {
    pub(crate) fn malformed(reason: impl Into<String>, offset: Option<usize>) -> Self {
        GuardError::Malformed {
            reason: reason.into(),
            offset,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            GuardError::Malformed { .. } | GuardError::Stacked { .. } | GuardError::NotSelect { .. } => {
                ErrorCode::InvalidSql
            }
            GuardError::WriteDenied { .. } => ErrorCode::WriteOperationDenied,
            GuardError::Parameter { .. } => ErrorCode::ParameterError,
        }
    }

    /// The token that caused the rejection, when there is a single culprit.
    pub fn offending_token(&self) -> Option<&str> {
        match self {
            GuardError::WriteDenied { keyword, .. } => Some(keyword),
            GuardError::NotSelect { found } => Some(found),
            _ => None,
        }
    }
}

impl From<GuardError> for ToolError {
    fn from(err: GuardError) -> Self {
        let code = err.code();
        let mut tool_error = ToolError::new(code, err.to_string());
        match &err {
            GuardError::WriteDenied {
                keyword,
                position,
                offset,
            } => {
                tool_error = tool_error
                    .with_context("keyword", keyword.as_str())
                    .with_context("token_position", *position)
                    .with_context("offset", *offset);
            }
            GuardError::Stacked { offset } => {
                tool_error = tool_error
                    .with_suggestion("Submit one statement per call and remove the extra ';'")
                    .with_context("offset", *offset);
            }
            GuardError::NotSelect { found } => {
                tool_error = tool_error
                    .with_suggestion("Only SELECT and WITH ... SELECT queries are allowed")
                    .with_context("found", found.as_str());
            }
            GuardError::Malformed {
                offset: Some(offset),
                ..
            } => {
                tool_error = tool_error.with_context("offset", *offset);
            }
            GuardError::Malformed { offset: None, .. } | GuardError::Parameter { .. } => {}
        }
        tool_error
    }
}
