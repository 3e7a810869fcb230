//! Error taxonomy surfaced to tool callers.
//!
//! Every tool failure ends up as a [`ToolErrorResponse`]:
//!
//! ```json
//! {
//!   "error": { "code": "TABLE_NOT_FOUND", "message": "...", "suggestion": "...", "context": {} },
//!   "tool_name": "describe_table",
//!   "input_received": { "table_name": "userz" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SchemaNotFound,
    TableNotFound,
    ColumnNotFound,
    InvalidSql,
    WriteOperationDenied,
    QueryTimeout,
    ConnectionError,
    PermissionDenied,
    ParameterError,
    PathNotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SchemaNotFound => "SCHEMA_NOT_FOUND",
            ErrorCode::TableNotFound => "TABLE_NOT_FOUND",
            ErrorCode::ColumnNotFound => "COLUMN_NOT_FOUND",
            ErrorCode::InvalidSql => "INVALID_SQL",
            ErrorCode::WriteOperationDenied => "WRITE_OPERATION_DENIED",
            ErrorCode::QueryTimeout => "QUERY_TIMEOUT",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::ParameterError => "PARAMETER_ERROR",
            ErrorCode::PathNotFound => "PATH_NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Next step offered to the caller when nothing more specific is known.
    pub fn default_suggestion(&self) -> &'static str {
        match self {
            ErrorCode::SchemaNotFound => "List available schemas with list_schemas",
            ErrorCode::TableNotFound => "List tables in the schema with list_tables",
            ErrorCode::ColumnNotFound => "Describe the table with describe_table to see its columns",
            ErrorCode::InvalidSql => "Review the query syntax",
            ErrorCode::WriteOperationDenied => "This server only supports read operations",
            ErrorCode::QueryTimeout => "Simplify the query, add filters, or raise timeout_ms",
            ErrorCode::ConnectionError => "Check database connectivity and retry",
            ErrorCode::PermissionDenied => "Contact the database administrator for access",
            ErrorCode::ParameterError => "Review the parameter constraints",
            ErrorCode::PathNotFound => "The tables may not be related through foreign keys",
            ErrorCode::InternalError => "Retry the request; report it if the problem persists",
        }
    }

    /// Lookup misses that get near-match suggestions attached.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            ErrorCode::SchemaNotFound | ErrorCode::TableNotFound | ErrorCode::ColumnNotFound
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured, caller-facing error.
///
/// `message` and `context` must never carry parameter values, connection
/// strings or credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
    pub suggestion: Option<String>,
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl ToolError {
    /// Create an error carrying the code's default suggestion.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestion: Some(code.default_suggestion().to_string()),
            context: Map::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Lookup miss enriched with near matches.
    ///
    /// `kind` is the noun used in the message ("schema", "table", "column").
    /// When `candidates` is non-empty the suggestion names them and the
    /// context carries them under `similar`.
    pub fn not_found(code: ErrorCode, kind: &str, name: &str, candidates: Vec<String>) -> Self {
        let err = Self::new(code, format!("{} '{}' not found", capitalize(kind), name))
            .with_context(kind, name);
        if candidates.is_empty() {
            return err;
        }
        let listed = candidates
            .iter()
            .map(|c| format!("'{}'", c))
            .collect::<Vec<_>>()
            .join(", ");
        err.with_suggestion(format!("Did you mean {}?", listed))
            .with_context("similar", candidates)
    }

    /// Attach the tool name and echoed input to produce the wire object.
    pub fn into_response(self, tool_name: impl Into<String>, input_received: Value) -> ToolErrorResponse {
        ToolErrorResponse {
            error: self,
            tool_name: tool_name.into(),
            input_received,
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Error payload returned in place of a tool's success payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolErrorResponse {
    pub error: ToolError,
    pub tool_name: String,
    pub input_received: Value,
}

/// Invariant violations when building model values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("foreign key {constraint_name} has no columns")]
    EmptyForeignKey { constraint_name: String },

    #[error("foreign key {constraint_name} maps {source_len} source columns to {target_len} target columns")]
    ForeignKeyArity {
        constraint_name: String,
        source_len: usize,
        target_len: usize,
    },

    #[error("unknown referential action: {0}")]
    UnknownReferentialAction(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_code_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_value(ErrorCode::WriteOperationDenied).unwrap(),
            json!("WRITE_OPERATION_DENIED")
        );
        assert_eq!(serde_json::to_value(ErrorCode::InvalidSql).unwrap(), json!("INVALID_SQL"));
        for code in [ErrorCode::QueryTimeout, ErrorCode::PathNotFound, ErrorCode::SchemaNotFound] {
            assert_eq!(serde_json::to_value(code).unwrap(), json!(code.as_str()));
        }
    }

    #[test]
    fn test_not_found_with_candidates() {
        let err = ToolError::not_found(
            ErrorCode::TableNotFound,
            "table",
            "userz",
            vec!["users".to_string()],
        );
        assert_eq!(err.message, "Table 'userz' not found");
        assert_eq!(err.suggestion.as_deref(), Some("Did you mean 'users'?"));
        assert_eq!(err.context["similar"], json!(["users"]));
    }

    #[test]
    fn test_not_found_without_candidates_keeps_default() {
        let err = ToolError::not_found(ErrorCode::SchemaNotFound, "schema", "nope", vec![]);
        assert_eq!(
            err.suggestion.as_deref(),
            Some(ErrorCode::SchemaNotFound.default_suggestion())
        );
        assert!(!err.context.contains_key("similar"));
    }

    #[test]
    fn test_response_shape() {
        let response = ToolError::new(ErrorCode::InvalidSql, "Unbalanced parentheses")
            .into_response("execute_query", json!({"sql": "SELECT ("}));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["error"]["code"], "INVALID_SQL");
        assert_eq!(value["error"]["context"], json!({}));
        assert_eq!(value["tool_name"], "execute_query");
        assert_eq!(value["input_received"]["sql"], "SELECT (");
    }
}
