// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::Path;

const ORCHESTRATOR_YAML: &str = r#"# Warren orchestrator configuration
listen: ":8080"
admin_listen: ":9090"

agents:
  myagent:
    hostname: myagent.example.com
    backend: "http://myagent:18790"
    policy: on-demand
    container:
      name: openclaw_myagent
    health:
      url: "http://myagent:18790/health"
      interval: 5s
      max_failures: 3
    idle:
      timeout: 45m
      wake_cooldown: 30s
    startup_timeout: 60s
    max_restart_attempts: 3

# webhooks:
#   - url: "https://hooks.example.com/warren"
#     events: [agent.degraded, agent.ready]
"#;

const STACK_YAML: &str = r#"# Compose stack running warren next to its agents
services:
  warren:
    image: warren:latest
    command: ["warren", "serve", "--config", "/etc/warren/orchestrator.yaml"]
    ports:
      - "8080:8080"
      - "9090:9090"
    volumes:
      - ./orchestrator.yaml:/etc/warren/orchestrator.yaml:ro
      - /var/run/docker.sock:/var/run/docker.sock

  myagent:
    container_name: openclaw_myagent
    build: ./myagent
    restart: "no"
"#;

const DOCKERFILE: &str = r#"FROM node:22-slim
WORKDIR /app
COPY . .
RUN npm install --omit=dev
EXPOSE 18790
CMD ["/usr/bin/supervisord", "-c", "/app/supervisord.conf"]
"#;

const SUPERVISORD_CONF: &str = r#"[supervisord]
nodaemon=true

[program:agent]
command=node server.js
autorestart=true
stdout_logfile=/dev/stdout
stdout_logfile_maxbytes=0
redirect_stderr=true
"#;

/// Writes starter orchestrator + stack files into the current directory.
pub fn init() -> Result<()> {
    init_in(Path::new("."))
}

fn init_in(dir: &Path) -> Result<()> {
    write_new(&dir.join("orchestrator.yaml"), ORCHESTRATOR_YAML)?;
    println!("{}", "Created orchestrator.yaml".green());
    write_new(&dir.join("stack.yaml"), STACK_YAML)?;
    println!("{}", "Created stack.yaml".green());
    println!("\nNext: edit orchestrator.yaml, then run `warren serve`.");
    Ok(())
}

/// Creates ./<name>/ with a Dockerfile, an agent manifest and a supervisord
/// config ready to drop into the stack.
pub fn scaffold(name: &str) -> Result<()> {
    scaffold_in(Path::new("."), name)
}

fn scaffold_in(base: &Path, name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        bail!("agent name must be alphanumeric (got {name:?})");
    }

    let dir = base.join(name);
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {dir:?}"))?;

    let manifest = serde_json::json!({
        "name": name,
        "port": 18790,
        "health": "/health",
    });

    std::fs::write(dir.join("Dockerfile"), DOCKERFILE)?;
    std::fs::write(
        dir.join("openclaw.json"),
        serde_json::to_string_pretty(&manifest)?,
    )?;
    std::fs::write(dir.join("supervisord.conf"), SUPERVISORD_CONF)?;

    println!("{}", format!("Scaffolded agent in ./{name}/").green());
    Ok(())
}

fn write_new(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        bail!("{} already exists, refusing to overwrite", path.display());
    }
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_files() {
        let dir = tempfile::tempdir().unwrap();

        init_in(dir.path()).unwrap();
        let orch = std::fs::read_to_string(dir.path().join("orchestrator.yaml")).unwrap();
        assert!(orch.contains("admin_listen"));
        let stack = std::fs::read_to_string(dir.path().join("stack.yaml")).unwrap();
        assert!(stack.contains("warren"));

        // Second run refuses to clobber.
        assert!(init_in(dir.path()).is_err());
    }

    #[test]
    fn test_init_config_is_valid() {
        let config = warren_core::domain::config::WarrenConfig::from_yaml_str(ORCHESTRATOR_YAML)
            .expect("starter config parses");
        config.validate().expect("starter config validates");
    }

    #[test]
    fn test_scaffold_creates_agent_dir() {
        let dir = tempfile::tempdir().unwrap();

        scaffold_in(dir.path(), "mybot").unwrap();
        for file in ["Dockerfile", "openclaw.json", "supervisord.conf"] {
            assert!(dir.path().join("mybot").join(file).exists(), "{file} missing");
        }
        let manifest = std::fs::read_to_string(dir.path().join("mybot/openclaw.json")).unwrap();
        assert!(manifest.contains("mybot"));
    }

    #[test]
    fn test_scaffold_rejects_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scaffold_in(dir.path(), "../escape").is_err());
        assert!(scaffold_in(dir.path(), "").is_err());
        assert!(scaffold_in(dir.path(), "has space").is_err());
    }
}
