use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use pglens_core::{LogFormat, LoggingConfig, PglensConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "pglens", version, about = "Read-only Postgres explorer for AI agents (MCP server)")]
struct Cli {
    /// Path to pglens.yaml. Built-in defaults apply when omitted.
    #[arg(long, short = 'c', global = true, env = "PGLENS_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format. Logs always go to stderr.
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the database and serve the MCP tools.
    Serve(commands::serve::ServeArgs),

    /// Run the read-only validator on a statement without a database.
    Check(commands::check::CheckArgs),

    /// Print the tool definitions advertised to clients.
    Tools(commands::tools::ToolsArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging, cli.log_format.map(LogFormat::from))?;

    match cli.cmd {
        Command::Serve(args) => commands::serve::run(config, args).await,
        Command::Check(args) => commands::check::run(args),
        Command::Tools(args) => commands::tools::run(args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PglensConfig> {
    match path {
        Some(path) => PglensConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(PglensConfig::default()),
    }
}

/// `RUST_LOG` wins over `logging.level`.
fn init_logging(logging: &LoggingConfig, format: Option<LogFormat>) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("invalid logging.level '{}'", logging.level))?,
    };

    match format.unwrap_or(logging.format) {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
    Ok(())
}
