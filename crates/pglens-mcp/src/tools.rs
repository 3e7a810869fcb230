//! The fixed tool set: definitions advertised by `tools/list` and the
//! typed requests `tools/call` decodes into.

use crate::protocol::{ToolAnnotations, ToolDefinition};
use serde::Deserialize;
use serde_json::{Value, json};

pub const LIST_SCHEMAS: &str = "list_schemas";
pub const LIST_TABLES: &str = "list_tables";
pub const DESCRIBE_TABLE: &str = "describe_table";
pub const GET_SAMPLE_ROWS: &str = "get_sample_rows";
pub const GET_FOREIGN_KEYS: &str = "get_foreign_keys";
pub const FIND_JOIN_PATH: &str = "find_join_path";
pub const EXECUTE_QUERY: &str = "execute_query";
pub const EXPLAIN_QUERY: &str = "explain_query";

pub const TOOL_NAMES: [&str; 8] = [
    LIST_SCHEMAS,
    LIST_TABLES,
    DESCRIBE_TABLE,
    GET_SAMPLE_ROWS,
    GET_FOREIGN_KEYS,
    FIND_JOIN_PATH,
    EXECUTE_QUERY,
    EXPLAIN_QUERY,
];

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ListSchemasArgs {
    #[serde(default)]
    pub include_system: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListTablesArgs {
    pub schema_name: Option<String>,
    #[serde(default = "yes")]
    pub include_views: bool,
    pub name_pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DescribeTableArgs {
    pub table_name: String,
    pub schema_name: Option<String>,
    #[serde(default = "yes")]
    pub include_indexes: bool,
    #[serde(default = "yes")]
    pub include_constraints: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GetSampleRowsArgs {
    pub table_name: String,
    pub schema_name: Option<String>,
    pub limit: Option<i64>,
    pub columns: Option<Vec<String>>,
    pub where_clause: Option<String>,
    #[serde(default)]
    pub randomize: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GetForeignKeysArgs {
    pub table_name: String,
    pub schema_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FindJoinPathArgs {
    pub from_table: String,
    pub to_table: String,
    pub from_schema: Option<String>,
    pub to_schema: Option<String>,
    pub max_depth: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecuteQueryArgs {
    pub sql: String,
    pub params: Option<Vec<Value>>,
    pub limit: Option<i64>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExplainQueryArgs {
    pub sql: String,
    pub params: Option<Vec<Value>>,
    #[serde(default)]
    pub analyze: bool,
    pub format: Option<String>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub buffers: bool,
}

/// A decoded `tools/call`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolRequest {
    ListSchemas(ListSchemasArgs),
    ListTables(ListTablesArgs),
    DescribeTable(DescribeTableArgs),
    GetSampleRows(GetSampleRowsArgs),
    GetForeignKeys(GetForeignKeysArgs),
    FindJoinPath(FindJoinPathArgs),
    ExecuteQuery(ExecuteQueryArgs),
    ExplainQuery(ExplainQueryArgs),
}

/// Why a `tools/call` could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnknownTool(String),
    InvalidArguments { tool: String, reason: String },
}

impl ToolRequest {
    /// Decode `arguments` for the tool called `name`. Missing arguments are
    /// treated as an empty object.
    pub fn decode(name: &str, arguments: Option<Value>) -> Result<Self, DecodeError> {
        if !TOOL_NAMES.contains(&name) {
            return Err(DecodeError::UnknownTool(name.to_string()));
        }
        let arguments = match arguments {
            None | Some(Value::Null) => json!({}),
            Some(arguments) => arguments,
        };
        serde_json::from_value(json!({ "name": name, "arguments": arguments })).map_err(|e| {
            DecodeError::InvalidArguments {
                tool: name.to_string(),
                reason: without_values(&e.to_string()),
            }
        })
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolRequest::ListSchemas(_) => LIST_SCHEMAS,
            ToolRequest::ListTables(_) => LIST_TABLES,
            ToolRequest::DescribeTable(_) => DESCRIBE_TABLE,
            ToolRequest::GetSampleRows(_) => GET_SAMPLE_ROWS,
            ToolRequest::GetForeignKeys(_) => GET_FOREIGN_KEYS,
            ToolRequest::FindJoinPath(_) => FIND_JOIN_PATH,
            ToolRequest::ExecuteQuery(_) => EXECUTE_QUERY,
            ToolRequest::ExplainQuery(_) => EXPLAIN_QUERY,
        }
    }
}

/// Echo of the call arguments for error payloads. Each SQL parameter value
/// is replaced with `"<redacted>"`.
pub fn redacted_input(arguments: &Option<Value>) -> Value {
    let mut input = match arguments {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => json!({}),
    };
    match input.get_mut("params") {
        Some(Value::Array(params)) => {
            for param in params.iter_mut() {
                *param = json!("<redacted>");
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => *other = json!("<redacted>"),
    }
    input
}

/// serde names the offending value in type errors
/// (`invalid type: string "abc", expected u32`); keep only its kind.
fn without_values(reason: &str) -> String {
    for marker in ["invalid type: ", "invalid value: "] {
        let Some((head, rest)) = reason.split_once(marker) else {
            continue;
        };
        // rsplit: the value itself may contain ", expected ".
        if let Some((unexpected, expected)) = rest.rsplit_once(", expected ") {
            let kind = unexpected.split(['"', '`']).next().unwrap_or_default().trim_end();
            return format!("{head}{marker}{kind}, expected {expected}");
        }
    }
    reason.to_string()
}

/// Definitions for every tool, in discovery order.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: LIST_SCHEMAS.to_string(),
            description: "List database schemas with their owner, description and table count. \
                          Start here when exploring an unfamiliar database."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "include_system": {
                        "type": "boolean",
                        "default": false,
                        "description": "Include pg_* and information_schema"
                    }
                }
            }),
            annotations: ToolAnnotations::read_only(true),
        },
        ToolDefinition {
            name: LIST_TABLES.to_string(),
            description: "List tables (and optionally views) in a schema with estimated row counts, \
                          sizes and column counts."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "schema_name": {"type": "string", "default": "public"},
                    "include_views": {"type": "boolean", "default": true},
                    "name_pattern": {
                        "type": "string",
                        "description": "SQL LIKE pattern on the table name, e.g. 'user%'"
                    }
                }
            }),
            annotations: ToolAnnotations::read_only(true),
        },
        ToolDefinition {
            name: DESCRIBE_TABLE.to_string(),
            description: "Describe a table: columns with types, nullability, defaults and key flags, \
                          plus its indexes and constraints."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "table_name": {"type": "string"},
                    "schema_name": {"type": "string", "default": "public"},
                    "include_indexes": {"type": "boolean", "default": true},
                    "include_constraints": {"type": "boolean", "default": true}
                },
                "required": ["table_name"]
            }),
            annotations: ToolAnnotations::read_only(true),
        },
        ToolDefinition {
            name: GET_SAMPLE_ROWS.to_string(),
            description: "Fetch a few rows from a table to see what the data looks like. \
                          Rows follow the primary key unless randomize is set."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "table_name": {"type": "string"},
                    "schema_name": {"type": "string", "default": "public"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 100, "default": 5},
                    "columns": {"type": "array", "items": {"type": "string"}},
                    "where_clause": {
                        "type": "string",
                        "description": "Predicate without the WHERE keyword, e.g. status = 'active'"
                    },
                    "randomize": {"type": "boolean", "default": false}
                },
                "required": ["table_name"]
            }),
            annotations: ToolAnnotations::read_only(false),
        },
        ToolDefinition {
            name: GET_FOREIGN_KEYS.to_string(),
            description: "List foreign keys declared on a table and foreign keys on other tables \
                          that reference it."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "table_name": {"type": "string"},
                    "schema_name": {"type": "string", "default": "public"}
                },
                "required": ["table_name"]
            }),
            annotations: ToolAnnotations::read_only(true),
        },
        ToolDefinition {
            name: FIND_JOIN_PATH.to_string(),
            description: "Find the shortest ways to join two tables through foreign keys, \
                          each with a ready-to-run SQL example."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "from_table": {"type": "string"},
                    "to_table": {"type": "string"},
                    "from_schema": {"type": "string", "default": "public"},
                    "to_schema": {"type": "string", "default": "public"},
                    "max_depth": {"type": "integer", "minimum": 1, "maximum": 6, "default": 4}
                },
                "required": ["from_table", "to_table"]
            }),
            annotations: ToolAnnotations::read_only(true),
        },
        ToolDefinition {
            name: EXECUTE_QUERY.to_string(),
            description: "Run a read-only SELECT (or WITH ... SELECT) query. Use $1, $2, ... \
                          placeholders with params. Results are capped at limit rows; has_more \
                          reports truncation."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sql": {"type": "string"},
                    "params": {"type": "array", "description": "Values for $1..$N, in order"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 10000, "default": 1000},
                    "timeout_ms": {"type": "integer", "minimum": 1}
                },
                "required": ["sql"]
            }),
            annotations: ToolAnnotations::read_only(true),
        },
        ToolDefinition {
            name: EXPLAIN_QUERY.to_string(),
            description: "Show the execution plan of a read-only query with estimated cost and rows. \
                          With analyze the query really runs and actual timings are reported."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sql": {"type": "string"},
                    "params": {"type": "array"},
                    "analyze": {"type": "boolean", "default": false},
                    "format": {"type": "string", "enum": ["text", "json", "yaml"], "default": "text"},
                    "verbose": {"type": "boolean", "default": false},
                    "buffers": {
                        "type": "boolean",
                        "default": false,
                        "description": "Only honoured together with analyze"
                    }
                },
                "required": ["sql"]
            }),
            annotations: ToolAnnotations::read_only(true),
        },
    ]
}
