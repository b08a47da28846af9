// Command-line and environment configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use marketo_sdk::MarketoClient;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "marketo-mcp")]
#[command(about = "MCP server exposing the Marketo REST API as tools", long_about = None)]
#[command(version)]
pub struct McpConfig {
    /// Marketo REST base URL, e.g. https://123-ABC-456.mktorest.com/rest
    #[arg(long, env = "MARKETO_BASE_URL")]
    pub base_url: Option<String>,

    /// API client ID
    #[arg(long, env = "MARKETO_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    /// API client secret
    #[arg(long, env = "MARKETO_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Identity service URL (derived from the base URL when omitted)
    #[arg(long, env = "MARKETO_IDENTITY_URL")]
    pub identity_url: Option<String>,

    /// Timeout for each outbound request, in seconds
    #[arg(long, env = "MARKETO_TIMEOUT_SECS", default_value = "30")]
    pub timeout_secs: u64,

    /// Seconds subtracted from a token's lifetime before it is considered expired
    #[arg(long, env = "MARKETO_TOKEN_MARGIN_SECS", default_value = "60")]
    pub token_margin_secs: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve MCP over stdio (default)
    Serve,
    /// Print an MCP client configuration snippet for this binary
    Settings,
}

impl McpConfig {
    /// Parse the command line, after loading a `.env` file from the working
    /// directory when one exists. Variables already set in the environment win.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Build the Marketo client. Missing credentials are fatal.
    pub fn build_client(&self) -> Result<MarketoClient> {
        let base_url = required(&self.base_url, "MARKETO_BASE_URL")?;
        let client_id = required(&self.client_id, "MARKETO_CLIENT_ID")?;
        let client_secret = required(&self.client_secret, "MARKETO_CLIENT_SECRET")?;

        let mut builder = MarketoClient::builder()
            .base_url(base_url)
            .client_id(client_id)
            .client_secret(client_secret)
            .timeout(Duration::from_secs(self.timeout_secs))
            .token_safety_margin(Duration::from_secs(self.token_margin_secs));

        if let Some(identity_url) = &self.identity_url {
            builder = builder.identity_url(identity_url);
        }

        builder.build().context("Failed to configure the Marketo client")
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .with_context(|| format!("{} environment variable is required", name))
}

/// JSON snippet to paste into an MCP client's server list.
pub fn settings_snippet(command: &str) -> serde_json::Value {
    serde_json::json!({
        "mcpServers": {
            "Marketo": {
                "command": command,
                "args": [],
                "env": {
                    "MARKETO_BASE_URL": "<REPLACE>",
                    "MARKETO_CLIENT_ID": "<REPLACE>",
                    "MARKETO_CLIENT_SECRET": "<REPLACE>"
                }
            }
        }
    })
}
