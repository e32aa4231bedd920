//! Lights-out CLI
//!
//! Triggers start/stop/status/discover runs on a lights-out server and
//! shows its health.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, invoke};
use std::process::ExitCode;

/// Lights-out CLI
#[derive(Parser)]
#[command(name = "lo")]
#[command(author, version, about = "CLI for the lights-out resource scheduler", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via LIGHTS_OUT_API_URL env var)
    #[arg(long, env = "LIGHTS_OUT_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Correlation id sent with the request
    #[arg(long)]
    pub request_id: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start managed resources, lowest priority first
    Start,

    /// Stop managed resources, highest priority first
    Stop,

    /// Report the state of every managed resource
    Status,

    /// List managed resources without touching them
    Discover,

    /// Run an action by name
    Invoke {
        /// One of start, stop, status, discover
        action: String,
    },

    /// Show server health and readiness
    Health,
}

impl Commands {
    fn action(&self) -> Option<&str> {
        match self {
            Commands::Start => Some("start"),
            Commands::Stop => Some("stop"),
            Commands::Status => Some("status"),
            Commands::Discover => Some("discover"),
            Commands::Invoke { action } => Some(action.as_str()),
            Commands::Health => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let api_url = config::Config::load()?.resolve_api_url(cli.api_url.clone());
    let client = client::ApiClient::new(&api_url)?;

    let ok = match cli.command.action() {
        Some(action) => {
            invoke::run_action(&client, action, cli.request_id.as_deref(), cli.format).await?
        }
        None => health::show_health(&client, cli.format).await?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
