//! # pglens-mcp
//!
//! MCP (Model Context Protocol) server exposing a Postgres database through
//! eight read-only tools:
//!
//! | Tool | Purpose |
//! |------|---------|
//! | `list_schemas` | Schemas with owners and table counts |
//! | `list_tables` | Tables and views in a schema |
//! | `describe_table` | Columns, indexes and constraints |
//! | `get_sample_rows` | A few rows to show what the data looks like |
//! | `get_foreign_keys` | Outgoing and incoming foreign keys |
//! | `find_join_path` | Shortest foreign-key join chains between two tables |
//! | `execute_query` | Run a validated `SELECT` with row and time limits |
//! | `explain_query` | Plan a validated `SELECT`, optionally with `ANALYZE` |
//!
//! ```text
//! AI agent
//!    │  tools/list, tools/call (stdio or HTTP)
//!    ▼
//! McpServer ── ToolRequest ──▶ ToolHandlers
//!                                 ├─ pglens-guard    validate SQL
//!                                 ├─ pglens-graph    join paths
//!                                 └─ pglens-runtime  catalog + pipeline
//!                                          │
//!                                          ▼
//!                                      Postgres
//! ```

pub mod error;
pub mod handlers;
pub mod http_transport;
pub mod protocol;
pub mod server;
pub mod tools;

pub use error::McpError;
pub use handlers::ToolHandlers;
pub use protocol::{CallToolParams, CallToolResult, JsonRpcRequest, JsonRpcResponse, ToolAnnotations, ToolDefinition};
pub use server::McpServer;
pub use tools::{ToolRequest, tool_definitions};
