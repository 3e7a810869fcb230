//! `pglens serve` - connect to Postgres and run the MCP server.

use anyhow::{Context, Result};
use clap::Args;
use pglens_adapter_pg::{PostgresAdapter, PostgresAdapterOptions};
use pglens_core::{PglensConfig, Transport};
use pglens_mcp::{McpServer, ToolHandlers};
use pglens_runtime::CatalogAdapter;
use std::sync::Arc;

/// Flags that override the configuration file.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Postgres connection URL. Overrides every `database` connection field.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Transport to serve on.
    #[arg(long, short = 't')]
    pub transport: Option<Transport>,

    /// HTTP bind host.
    #[arg(long)]
    pub host: Option<String>,

    /// HTTP port.
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Schema used when a tool call omits one.
    #[arg(long)]
    pub default_schema: Option<String>,
}

impl ServeArgs {
    fn apply(self, config: &mut PglensConfig) {
        if let Some(url) = self.database_url {
            config.database.database_url = Some(url);
            config.database.database_url_env = None;
        }
        if let Some(transport) = self.transport {
            config.mcp.transport = transport;
        }
        if let Some(host) = self.host {
            config.mcp.host = host;
        }
        if let Some(port) = self.port {
            config.mcp.port = port;
        }
        if let Some(schema) = self.default_schema {
            config.database.default_schema = schema;
        }
    }
}

pub async fn run(mut config: PglensConfig, args: ServeArgs) -> Result<()> {
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let options = PostgresAdapterOptions::from_query_config(&config.query);
    let adapter = Arc::new(PostgresAdapter::connect(&config.database, options).await?);
    adapter
        .ping()
        .await
        .with_context(|| format!("database at {} is not answering", config.database.display_target()))?;

    let tools = ToolHandlers::new(adapter.clone(), adapter, &config);
    let server = McpServer::new(config.mcp.clone(), tools);

    tracing::info!(
        transport = %config.mcp.transport,
        default_schema = %config.database.default_schema,
        "pglens ready"
    );
    if config.mcp.is_http() {
        tracing::info!(address = %config.mcp.bind_address(), "serving MCP over HTTP");
    }

    server.run().await?;
    Ok(())
}
