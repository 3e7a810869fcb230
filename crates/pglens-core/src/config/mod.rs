//! Configuration types for pglens.
//!
//! Configuration is read from a single YAML file (`pglens.yaml` by default).
//! Every section and field has a default, so an empty file is valid. The CLI
//! layers flag and environment overrides on top of the loaded value.
//!
//! ```yaml
//! database:
//!   database_url_env: DATABASE_URL
//!   default_schema: public
//!   pool:
//!     max_connections: 5
//! query:
//!   statement_timeout_ms: 30000
//! graph:
//!   snapshot_ttl_seconds: 60
//! mcp:
//!   transport: stdio
//! logging:
//!   level: info
//!   format: text
//! ```

pub mod database;
pub mod mcp;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use database::{ConnectionPoolConfig, DatabaseConfig, SslMode};
pub use mcp::{McpConfig, Transport};

/// Complete pglens configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PglensConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub mcp: McpConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limits applied to `execute_query`, `explain_query` and `get_sample_rows`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Server-side `statement_timeout` applied when a call gives no
    /// `timeout_ms`.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,

    /// Upper bound for a caller-supplied `timeout_ms`.
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Extra time the client waits past the server deadline before it
    /// abandons the connection.
    #[serde(default = "default_timeout_grace_ms")]
    pub timeout_grace_ms: u64,

    #[serde(default = "default_limit")]
    pub default_limit: u32,

    #[serde(default = "default_max_limit")]
    pub max_limit: u32,

    #[serde(default = "default_sample_limit")]
    pub sample_default_limit: u32,

    #[serde(default = "default_sample_max_limit")]
    pub sample_max_limit: u32,

    /// Estimated row count above which a sequential scan is flagged by
    /// `explain_query`.
    #[serde(default = "default_seq_scan_warning_rows")]
    pub seq_scan_warning_rows: f64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            statement_timeout_ms: default_statement_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            timeout_grace_ms: default_timeout_grace_ms(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            sample_default_limit: default_sample_limit(),
            sample_max_limit: default_sample_max_limit(),
            seq_scan_warning_rows: default_seq_scan_warning_rows(),
        }
    }
}

/// Relationship graph snapshot and path search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// How long a built graph snapshot is reused. `0` rebuilds on every call.
    #[serde(default = "default_snapshot_ttl")]
    pub snapshot_ttl_seconds: u64,

    #[serde(default = "default_max_depth")]
    pub default_max_depth: usize,

    /// Hard ceiling on `max_depth`, whatever the caller asks for.
    #[serde(default = "default_max_depth_limit")]
    pub max_depth_limit: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_seconds: default_snapshot_ttl(),
            default_max_depth: default_max_depth(),
            max_depth_limit: default_max_depth_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_statement_timeout_ms() -> u64 {
    30_000
}

fn default_max_timeout_ms() -> u64 {
    300_000
}

fn default_timeout_grace_ms() -> u64 {
    1_000
}

fn default_limit() -> u32 {
    1000
}

fn default_max_limit() -> u32 {
    10_000
}

fn default_sample_limit() -> u32 {
    5
}

fn default_sample_max_limit() -> u32 {
    100
}

fn default_seq_scan_warning_rows() -> f64 {
    10_000.0
}

fn default_snapshot_ttl() -> u64 {
    60
}

fn default_max_depth() -> usize {
    4
}

fn default_max_depth_limit() -> usize {
    6
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PglensConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content. Empty content yields defaults.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let q = &self.query;
        if q.statement_timeout_ms < 1000 {
            return Err(ConfigError::Config(
                "query.statement_timeout_ms must be at least 1000".to_string(),
            ));
        }
        if q.statement_timeout_ms > q.max_timeout_ms {
            return Err(ConfigError::Config(
                "query.statement_timeout_ms exceeds query.max_timeout_ms".to_string(),
            ));
        }
        if q.default_limit == 0 || q.default_limit > q.max_limit {
            return Err(ConfigError::Config(format!(
                "query.default_limit must be within 1..={}",
                q.max_limit
            )));
        }
        if q.sample_default_limit == 0 || q.sample_default_limit > q.sample_max_limit {
            return Err(ConfigError::Config(format!(
                "query.sample_default_limit must be within 1..={}",
                q.sample_max_limit
            )));
        }
        let g = &self.graph;
        if g.max_depth_limit == 0 || g.default_max_depth == 0 || g.default_max_depth > g.max_depth_limit {
            return Err(ConfigError::Config(format!(
                "graph.default_max_depth must be within 1..={}",
                g.max_depth_limit
            )));
        }
        let pool = &self.database.pool;
        if pool.max_connections == 0 || pool.min_connections > pool.max_connections {
            return Err(ConfigError::Config(
                "database.pool.max_connections must be >= min_connections and > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_yaml_is_default() {
        let config = PglensConfig::from_yaml("").unwrap();
        assert_eq!(config.database.default_schema, "public");
        assert_eq!(config.query.statement_timeout_ms, 30_000);
        assert_eq!(config.query.default_limit, 1000);
        assert_eq!(config.graph.max_depth_limit, 6);
        assert_eq!(config.mcp.transport, Transport::Stdio);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r#"
database:
  database_url_env: SHOP_DB
  pool:
    max_connections: 12
mcp:
  transport: http
  port: 9000
logging:
  format: json
"#;
        let config = PglensConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.database.database_url_env.as_deref(), Some("SHOP_DB"));
        assert_eq!(config.database.pool.max_connections, 12);
        assert_eq!(config.database.pool.acquire_timeout_seconds, 30);
        assert!(config.mcp.is_http());
        assert_eq!(config.mcp.bind_address(), "0.0.0.0:9000");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_rejects_short_statement_timeout() {
        let err = PglensConfig::from_yaml("query:\n  statement_timeout_ms: 10\n").unwrap_err();
        assert!(matches!(err, ConfigError::Config(_)));
    }

    #[test]
    fn test_rejects_depth_over_limit() {
        let yaml = "graph:\n  default_max_depth: 9\n  max_depth_limit: 6\n";
        assert!(PglensConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database:\n  default_schema: sales").unwrap();
        let config = PglensConfig::from_file(file.path()).unwrap();
        assert_eq!(config.database.default_schema, "sales");
    }
}
