// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::client::AdminClient;
use anyhow::Result;
use colored::Colorize;

/// Follows the orchestrator's SSE event stream until it closes.
pub async fn run(admin_url: &str) -> Result<()> {
    let client = AdminClient::new(admin_url);
    client
        .stream_events(|data| match serde_json::from_str::<serde_json::Value>(data) {
            Ok(event) => {
                let timestamp = event["timestamp"].as_str().unwrap_or("");
                let kind = event["type"].as_str().unwrap_or("unknown");
                let agent = event["agent"].as_str().unwrap_or("-");
                match event["detail"].as_str() {
                    Some(detail) => println!(
                        "{} {} {} - {}",
                        format!("[{timestamp}]").dimmed(),
                        kind.cyan(),
                        agent.bold(),
                        detail
                    ),
                    None => println!(
                        "{} {} {}",
                        format!("[{timestamp}]").dimmed(),
                        kind.cyan(),
                        agent.bold()
                    ),
                }
            }
            // Not every payload is an event object; print it as-is.
            Err(_) => println!("{data}"),
        })
        .await
}
