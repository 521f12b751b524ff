// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use warren_core::domain::config::WarrenConfig;

/// Validates a configuration file without starting anything.
pub fn run(file: &Path) -> Result<()> {
    let config = WarrenConfig::from_yaml_file(file)?;
    config
        .validate()
        .with_context(|| format!("validation failed for {file:?}"))?;

    println!(
        "{} {} ({} agents, {} webhooks)",
        "OK".green().bold(),
        file.display(),
        config.agents.len(),
        config.webhooks.len(),
    );
    Ok(())
}
