// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::client::AdminClient;
use crate::OutputFormat;
use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;
use std::io::{BufRead, Write};

#[derive(Subcommand)]
pub enum AgentCommand {
    /// List agents
    List,

    /// Add an agent at runtime
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        hostname: String,
        #[arg(long)]
        backend: String,
        /// on-demand, always-on or unmanaged
        #[arg(long)]
        policy: String,
        #[arg(long, value_name = "NAME")]
        container_name: Option<String>,
        #[arg(long, value_name = "URL")]
        health_url: Option<String>,
        /// Idle period before sleep, e.g. "45m"
        #[arg(long, value_name = "DURATION")]
        idle_timeout: Option<String>,
    },

    /// Remove an agent
    Remove {
        name: String,
    },

    /// Show an agent's state and counters
    Inspect {
        name: String,
    },

    /// Wake a sleeping agent
    Wake {
        name: String,
    },

    /// Put an agent to sleep
    Sleep {
        name: String,
    },
}

pub async fn handle(command: AgentCommand, admin_url: &str, format: OutputFormat) -> Result<()> {
    let client = AdminClient::new(admin_url);
    match command {
        AgentCommand::List => list(&client, format).await,
        AgentCommand::Add {
            name,
            hostname,
            backend,
            policy,
            container_name,
            health_url,
            idle_timeout,
        } => {
            add(
                &client,
                json!({
                    "name": name,
                    "hostname": hostname,
                    "backend": backend,
                    "policy": policy,
                    "container_name": container_name.unwrap_or_default(),
                    "health_url": health_url.unwrap_or_default(),
                    "idle_timeout": idle_timeout,
                }),
            )
            .await
        }
        AgentCommand::Remove { name } => remove(&client, &name).await,
        AgentCommand::Inspect { name } => inspect(&client, &name, format).await,
        AgentCommand::Wake { name } => wake(&client, &name).await,
        AgentCommand::Sleep { name } => sleep(&client, &name).await,
    }
}

async fn list(client: &AdminClient, format: OutputFormat) -> Result<()> {
    let agents = client.get_json("/admin/agents").await?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string(&agents)?);
        return Ok(());
    }

    println!(
        "{:<16} {:<28} {:<12} {:<10} {}",
        "NAME", "HOSTNAME", "POLICY", "STATE", "CONNECTIONS"
    );
    for agent in agents.as_array().map(Vec::as_slice).unwrap_or_default() {
        println!(
            "{:<16} {:<28} {:<12} {:<10} {}",
            agent["name"].as_str().unwrap_or("-"),
            agent["hostname"].as_str().unwrap_or("-"),
            agent["policy"].as_str().unwrap_or("-"),
            agent["state"].as_str().unwrap_or("-"),
            agent["connections"].as_u64().unwrap_or(0),
        );
    }
    Ok(())
}

async fn add(client: &AdminClient, body: serde_json::Value) -> Result<()> {
    let response = client.post_json("/admin/agents", Some(body)).await?;
    println!(
        "{}",
        format!("✓ Agent {}", response["status"].as_str().unwrap_or("created")).green()
    );
    Ok(())
}

async fn remove(client: &AdminClient, name: &str) -> Result<()> {
    if !confirm(&format!("Remove agent {name:?}? [y/N] "))? {
        println!("Cancelled.");
        return Ok(());
    }

    let response = client.delete_json(&format!("/admin/agents/{name}")).await?;
    println!(
        "{}",
        format!("✓ Agent {name} {}", response["status"].as_str().unwrap_or("removed")).green()
    );
    Ok(())
}

async fn inspect(client: &AdminClient, name: &str, format: OutputFormat) -> Result<()> {
    let agent = client.get_json(&format!("/admin/agents/{name}")).await?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string(&agent)?);
        return Ok(());
    }

    println!("{}", agent["name"].as_str().unwrap_or(name).bold());
    for key in [
        "hostname",
        "backend",
        "policy",
        "state",
        "connections",
        "consecutive_failures",
        "restart_attempts",
        "seconds_since_sleep",
        "seconds_since_activity",
    ] {
        if let Some(value) = agent.get(key) {
            if !value.is_null() {
                println!("  {key}: {value}");
            }
        }
    }
    Ok(())
}

async fn wake(client: &AdminClient, name: &str) -> Result<()> {
    let response = client
        .post_json(&format!("/admin/agents/{name}/wake"), None)
        .await?;
    println!("{}", response["status"].as_str().unwrap_or("waking"));
    Ok(())
}

async fn sleep(client: &AdminClient, name: &str) -> Result<()> {
    let response = client
        .post_json(&format!("/admin/agents/{name}/sleep"), None)
        .await?;
    println!("{}", response["status"].as_str().unwrap_or("sleeping"));
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
