//! Execution and catalog errors.

use pglens_core::{ErrorCode, ModelError, ToolError};
use pglens_guard::GuardError;
use thiserror::Error;

/// Failure while running a statement against the database.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    /// The statement ran past its deadline and was cancelled.
    #[error("query exceeded the {timeout_ms} ms timeout and was cancelled")]
    Timeout { timeout_ms: u64 },

    /// No connection could be acquired, or the connection broke.
    #[error("database connection error: {0}")]
    Connection(String),

    /// Parameters do not match the statement's placeholders or types.
    #[error("{0}")]
    Parameter(String),

    /// The server rejected the statement.
    #[error("{message}")]
    Database {
        code: ErrorCode,
        sqlstate: Option<String>,
        message: String,
    },
}

impl ExecutionError {
    /// Classify a server error by SQLSTATE. `message` must be the server's
    /// message text only.
    pub fn from_sqlstate(sqlstate: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        let code = match sqlstate {
            Some("57014") => {
                return ExecutionError::Database {
                    code: ErrorCode::QueryTimeout,
                    sqlstate: sqlstate.map(str::to_string),
                    message,
                };
            }
            Some("42501") => ErrorCode::PermissionDenied,
            Some("25006") => ErrorCode::WriteOperationDenied,
            Some("42P01") => ErrorCode::TableNotFound,
            Some("42703") => ErrorCode::ColumnNotFound,
            Some("3F000") => ErrorCode::SchemaNotFound,
            Some(state) if state.starts_with("08") => {
                return ExecutionError::Connection(message);
            }
            Some(state) if state.starts_with("42") || state.starts_with("22") => ErrorCode::InvalidSql,
            Some(state) if state.starts_with("57P") || state.starts_with("53") => ErrorCode::ConnectionError,
            _ => ErrorCode::InternalError,
        };
        ExecutionError::Database {
            code,
            sqlstate: sqlstate.map(str::to_string),
            message,
        }
    }

    /// Drop server text that may quote a bound value.
    ///
    /// Data exceptions (class 22) and constraint violations (class 23) echo
    /// the offending input, e.g. `invalid input syntax for type integer:
    /// "..."`. Applied when the statement carried parameters.
    pub fn without_values(self) -> Self {
        match self {
            ExecutionError::Database {
                code,
                sqlstate: Some(state),
                ..
            } if state.starts_with("22") || state.starts_with("23") => ExecutionError::Database {
                code,
                message: format!(
                    "the database rejected a value (SQLSTATE {state}); check that each parameter \
                     matches the type its placeholder is compared with or cast to"
                ),
                sqlstate: Some(state),
            },
            other => other,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ExecutionError::Timeout { .. } => ErrorCode::QueryTimeout,
            ExecutionError::Connection(_) => ErrorCode::ConnectionError,
            ExecutionError::Parameter(_) => ErrorCode::ParameterError,
            ExecutionError::Database { code, .. } => *code,
        }
    }
}

impl From<GuardError> for ExecutionError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::Parameter { reason } => ExecutionError::Parameter(reason),
            other => ExecutionError::Database {
                code: other.code(),
                sqlstate: None,
                message: other.to_string(),
            },
        }
    }
}

impl From<ExecutionError> for ToolError {
    fn from(err: ExecutionError) -> Self {
        let mut tool_error = ToolError::new(err.code(), err.to_string());
        match &err {
            ExecutionError::Timeout { timeout_ms } => {
                tool_error = tool_error.with_context("timeout_ms", *timeout_ms);
            }
            ExecutionError::Database {
                sqlstate: Some(state),
                ..
            } => {
                tool_error = tool_error.with_context("sqlstate", state.as_str());
            }
            _ => {}
        }
        tool_error
    }
}

/// Failure while reading catalog metadata.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Query(#[from] ExecutionError),

    /// A catalog row that cannot be turned into the data model.
    #[error("unexpected catalog row for {object}: {source}")]
    InvalidRow {
        object: String,
        #[source]
        source: ModelError,
    },
}

impl CatalogError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CatalogError::Query(err) => err.code(),
            CatalogError::InvalidRow { .. } => ErrorCode::InternalError,
        }
    }
}

impl From<CatalogError> for ToolError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Query(err) => err.into(),
            other => ToolError::new(other.code(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlstate_mapping() {
        let cases = [
            ("57014", ErrorCode::QueryTimeout),
            ("42501", ErrorCode::PermissionDenied),
            ("25006", ErrorCode::WriteOperationDenied),
            ("42P01", ErrorCode::TableNotFound),
            ("42703", ErrorCode::ColumnNotFound),
            ("3F000", ErrorCode::SchemaNotFound),
            ("42601", ErrorCode::InvalidSql),
            ("22012", ErrorCode::InvalidSql),
            ("08006", ErrorCode::ConnectionError),
            ("57P01", ErrorCode::ConnectionError),
            ("XX000", ErrorCode::InternalError),
        ];
        for (state, code) in cases {
            assert_eq!(ExecutionError::from_sqlstate(Some(state), "boom").code(), code, "{state}");
        }
        assert_eq!(ExecutionError::from_sqlstate(None, "boom").code(), ErrorCode::InternalError);
    }

    #[test]
    fn test_parameter_guard_error_maps_to_parameter_error() {
        let err: ExecutionError = GuardError::Parameter {
            reason: "query uses 1 placeholder(s) but 0 parameter(s) were supplied".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::ParameterError);
    }

    #[test]
    fn test_tool_error_carries_sqlstate() {
        let tool: ToolError = ExecutionError::from_sqlstate(Some("42501"), "permission denied for table payroll").into();
        assert_eq!(tool.code, ErrorCode::PermissionDenied);
        assert_eq!(tool.message, "permission denied for table payroll");
        assert_eq!(tool.context["sqlstate"], "42501");
    }

    #[test]
    fn test_data_exceptions_drop_quoted_values() {
        let err = ExecutionError::from_sqlstate(
            Some("22P02"),
            "invalid input syntax for type integer: \"hunter2-secret\"",
        )
        .without_values();
        assert_eq!(err.code(), ErrorCode::InvalidSql);
        assert!(!err.to_string().contains("hunter2-secret"));
        assert!(err.to_string().contains("22P02"));

        let tool: ToolError = err.into();
        assert_eq!(tool.context["sqlstate"], "22P02");

        // Other classes name objects, not values.
        let err = ExecutionError::from_sqlstate(Some("42703"), "column \"emial\" does not exist").without_values();
        assert_eq!(err.to_string(), "column \"emial\" does not exist");
        assert_eq!(ExecutionError::Timeout { timeout_ms: 5 }.without_values(), ExecutionError::Timeout { timeout_ms: 5 });
    }

    #[test]
    fn test_timeout_reports_budget() {
        let tool: ToolError = ExecutionError::Timeout { timeout_ms: 500 }.into();
        assert_eq!(tool.code, ErrorCode::QueryTimeout);
        assert_eq!(tool.context["timeout_ms"], 500);
    }
}
