// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::client::AdminClient;
use crate::OutputFormat;
use anyhow::Result;
use colored::Colorize;

pub async fn run(admin_url: &str, format: OutputFormat) -> Result<()> {
    let client = AdminClient::new(admin_url);
    let health = client.get_json("/admin/health").await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string(&health)?);
        return Ok(());
    }

    println!("{}", "Warren Orchestrator".bold());
    println!(
        "  Uptime:      {}",
        format_uptime(health["uptime_seconds"].as_f64().unwrap_or(0.0) as u64)
    );
    println!(
        "  Agents:      {} ({} ready, {} sleeping)",
        health["agent_count"].as_u64().unwrap_or(0),
        health["ready_count"].as_u64().unwrap_or(0),
        health["sleeping_count"].as_u64().unwrap_or(0),
    );
    println!(
        "  Connections: {}",
        health["ws_connections"].as_u64().unwrap_or(0)
    );
    println!(
        "  Services:    {} dynamic routes",
        health["service_count"].as_u64().unwrap_or(0)
    );
    Ok(())
}

fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m {}s", seconds % 60)
    }
}
