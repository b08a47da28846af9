// Standalone MCP server binary

use anyhow::Result;
use marketo_mcp::config::{settings_snippet, Command, McpConfig};
use marketo_mcp::server::McpServer;
use marketo_mcp::tools::{register_all, ToolRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    let config = McpConfig::load();

    if config.command() == Command::Settings {
        let exe = std::env::current_exe()?;
        let snippet = settings_snippet(&exe.to_string_lossy());
        println!("{}", serde_json::to_string_pretty(&snippet)?);
        return Ok(());
    }

    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::info!("Marketo MCP Server starting...");

    let client = match config.build_client() {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("{:#}", e);
            return Err(e);
        }
    };

    let mut registry = ToolRegistry::new();
    register_all(&mut registry, &client);

    tracing::info!("Registered {} tools", registry.len());

    let server = McpServer::new(registry);
    server.start().await?;

    Ok(())
}
