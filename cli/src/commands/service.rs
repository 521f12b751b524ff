// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::client::AdminClient;
use crate::OutputFormat;
use anyhow::{bail, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;

#[derive(Subcommand)]
pub enum ServiceCommand {
    /// List dynamic routes
    List,

    /// Add a dynamic route
    Add {
        #[arg(long)]
        hostname: Option<String>,
        #[arg(long)]
        target: Option<String>,
        /// Agent whose lifecycle gates this route (optional)
        #[arg(long)]
        agent: Option<String>,
    },

    /// Remove a dynamic route
    Remove {
        hostname: String,
    },
}

pub async fn handle(command: ServiceCommand, admin_url: &str, format: OutputFormat) -> Result<()> {
    let client = AdminClient::new(admin_url);
    match command {
        ServiceCommand::List => list(&client, format).await,
        ServiceCommand::Add {
            hostname,
            target,
            agent,
        } => {
            let (Some(hostname), Some(target)) = (hostname, target) else {
                bail!("--hostname and --target are required");
            };
            add(&client, &hostname, &target, agent.as_deref()).await
        }
        ServiceCommand::Remove { hostname } => remove(&client, &hostname).await,
    }
}

async fn list(client: &AdminClient, format: OutputFormat) -> Result<()> {
    let services = client.get_json("/admin/services").await?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string(&services)?);
        return Ok(());
    }

    println!("{:<28} {:<32} {}", "HOSTNAME", "TARGET", "AGENT");
    for svc in services.as_array().map(Vec::as_slice).unwrap_or_default() {
        println!(
            "{:<28} {:<32} {}",
            svc["hostname"].as_str().unwrap_or("-"),
            svc["target"].as_str().unwrap_or("-"),
            svc["agent"].as_str().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn add(client: &AdminClient, hostname: &str, target: &str, agent: Option<&str>) -> Result<()> {
    let response = client
        .post_json(
            "/api/services",
            Some(json!({
                "hostname": hostname,
                "target": target,
                "agent": agent.unwrap_or_default(),
            })),
        )
        .await?;
    println!(
        "{}",
        format!("✓ Service {}", response["status"].as_str().unwrap_or("created")).green()
    );
    Ok(())
}

async fn remove(client: &AdminClient, hostname: &str) -> Result<()> {
    let response = client
        .delete_json(&format!("/api/services/{hostname}"))
        .await?;
    println!(
        "{}",
        format!("✓ Service {hostname} {}", response["status"].as_str().unwrap_or("removed")).green()
    );
    Ok(())
}
