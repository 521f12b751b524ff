// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Warren CLI
//!
//! The `warren` binary runs the orchestrator (`warren serve`) and manages a
//! running one over its admin API.
//!
//! ## Commands
//!
//! - `warren serve` - run the orchestrator process
//! - `warren agent list|add|remove|inspect|wake|sleep` - manage agents
//! - `warren service list|add|remove` - manage dynamic routes
//! - `warren status` / `warren events` - observe the orchestrator
//! - `warren config <file>` - validate a configuration file
//! - `warren init` / `warren scaffold <name>` - bootstrap files

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use warren_cli::commands::{self, AgentCommand, ServiceCommand};
use warren_cli::{client, OutputFormat};

/// Warren - on-demand orchestration for HTTP backend agents
#[derive(Parser)]
#[command(name = "warren")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Admin API URL (falls back to WARREN_ADMIN, then ~/.warren/config.yaml)
    #[arg(long, global = true)]
    admin: Option<String>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "WARREN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator
    Serve {
        /// Path to configuration file
        #[arg(short, long, env = "WARREN_CONFIG", default_value = "orchestrator.yaml")]
        config: PathBuf,
    },

    /// Manage agents
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Manage dynamic services
    Service {
        #[command(subcommand)]
        command: ServiceCommand,
    },

    /// Show orchestrator status
    Status,

    /// Follow the orchestrator event stream
    Events,

    /// Validate a configuration file
    Config {
        /// Path to configuration file
        file: PathBuf,
    },

    /// Write starter configuration files into the current directory
    Init,

    /// Scaffold an agent directory
    Scaffold {
        /// Agent name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let admin_url = client::resolve_admin_url(cli.admin.clone());
    let format = cli.format;

    match cli.command {
        Commands::Serve { config } => commands::serve::run(config).await,
        Commands::Agent { command } => commands::agent::handle(command, &admin_url, format).await,
        Commands::Service { command } => {
            commands::service::handle(command, &admin_url, format).await
        }
        Commands::Status => commands::status::run(&admin_url, format).await,
        Commands::Events => commands::events::run(&admin_url).await,
        Commands::Config { file } => commands::config::run(&file),
        Commands::Init => commands::scaffold::init(),
        Commands::Scaffold { name } => commands::scaffold::scaffold(&name),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
