//! `pglens tools` - list the tools the server advertises.

use anyhow::Result;
use clap::Args;
use pglens_mcp::tool_definitions;

#[derive(Args, Debug)]
pub struct ToolsArgs {
    /// Print the full definitions, input schemas included, as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ToolsArgs) -> Result<()> {
    let tools = tool_definitions();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }

    println!("Available tools ({}):", tools.len());
    for tool in &tools {
        let mode = if tool.annotations.idempotent_hint {
            "read-only"
        } else {
            "read-only, non-idempotent"
        };
        println!("  {} ({})", tool.name, mode);
        println!("    {}", tool.description);
    }
    Ok(())
}
