//! # pglens-core
//!
//! Types shared by every pglens crate:
//!
//! - [`model`]: table identities and foreign-key edges
//! - [`catalog`]: metadata rows returned by catalog adapters
//! - [`error`]: the error taxonomy surfaced to tool callers
//! - [`suggest`]: near-match suggestions for `*_NOT_FOUND` errors
//! - [`ident`]: Postgres identifier quoting
//! - [`config`]: server configuration loaded from `pglens.yaml`

pub mod catalog;
pub mod config;
pub mod error;
pub mod ident;
pub mod model;
pub mod suggest;

pub use catalog::{
    ColumnForeignKey, ColumnInfo, ConstraintInfo, IndexInfo, SchemaInfo, TableInfo, TableKind,
};
pub use config::{
    ConfigError, DatabaseConfig, GraphConfig, LogFormat, LoggingConfig, McpConfig, PglensConfig,
    QueryConfig, Transport,
};
pub use error::{ErrorCode, ModelError, ToolError, ToolErrorResponse};
pub use model::{ForeignKeyEdge, ReferentialAction, TableRef};
pub use suggest::suggest;
