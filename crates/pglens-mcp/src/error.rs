//! Error types for the MCP crate.
//!
//! Tool failures never use this type: they are [`pglens_core::ToolError`]
//! values returned to the caller as a normal tool result. `McpError` covers
//! the server itself failing.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to start the server.
    #[error("failed to start MCP server: {0}")]
    StartupFailed(String),

    /// The transport broke while serving.
    #[error("transport error: {0}")]
    TransportError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
