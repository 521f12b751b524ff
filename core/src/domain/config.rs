// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator configuration schema.
//
// YAML with humantime durations ("45m", "10s"). Optional knobs stay `None`
// in the parsed form and the accessor methods apply the documented defaults,
// so an explicit `wake_cooldown: 0s` (disable) is distinguishable from
// "not set".

use crate::domain::policy::PolicyKind;
use crate::security;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_WAKE_COOLDOWN: Duration = Duration::from_secs(30);
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_FAILURES: u32 = 3;
pub const DEFAULT_MAX_RESTART_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarrenConfig {
    /// Reverse proxy bind address.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Admin API bind address.
    #[serde(default = "default_admin_listen")]
    pub admin_listen: String,

    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,

    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Primary hostname the proxy routes to this agent.
    pub hostname: String,

    /// Additional hostnames routed to the same backend.
    #[serde(default)]
    pub hostnames: Vec<String>,

    /// Backend origin the proxy forwards to, e.g. "http://backend:18790".
    pub backend: String,

    pub policy: PolicyKind,

    #[serde(default)]
    pub container: ContainerConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub idle: IdleConfig,

    #[serde(default, with = "humantime_serde")]
    pub startup_timeout: Option<Duration>,

    #[serde(default)]
    pub max_restart_attempts: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default)]
    pub name: String,

    /// Image to create the container from when it does not exist. Containers
    /// deployed out of band (compose stacks) leave this unset.
    #[serde(default)]
    pub image: Option<String>,

    #[serde(default, with = "humantime_serde")]
    pub stop_grace: Option<Duration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,

    #[serde(default)]
    pub max_failures: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdleConfig {
    /// Inactivity required before an on-demand agent is put to sleep.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// Minimum interval after entering sleep before a wake is honored.
    /// Explicit `0s` disables the gate.
    #[serde(default, with = "humantime_serde")]
    pub wake_cooldown: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,

    /// Event type filter; empty means all events.
    #[serde(default)]
    pub events: Vec<String>,

    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl AgentConfig {
    pub fn check_interval(&self) -> Duration {
        self.health.interval.unwrap_or(DEFAULT_CHECK_INTERVAL)
    }

    pub fn max_failures(&self) -> u32 {
        self.health.max_failures.unwrap_or(DEFAULT_MAX_FAILURES)
    }

    pub fn startup_timeout(&self) -> Duration {
        self.startup_timeout.unwrap_or(DEFAULT_STARTUP_TIMEOUT)
    }

    pub fn wake_cooldown(&self) -> Duration {
        self.idle.wake_cooldown.unwrap_or(DEFAULT_WAKE_COOLDOWN)
    }

    pub fn max_restart_attempts(&self) -> u32 {
        self.max_restart_attempts
            .unwrap_or(DEFAULT_MAX_RESTART_ATTEMPTS)
    }

    pub fn stop_grace(&self) -> Duration {
        self.container.stop_grace.unwrap_or(DEFAULT_STOP_GRACE)
    }

    /// All hostnames routed to this agent, primary first.
    pub fn all_hostnames(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.hostname.as_str()).chain(self.hostnames.iter().map(String::as_str))
    }

    /// Per-agent validation, shared between config loading and runtime
    /// agent creation through the admin API.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.hostname.is_empty() {
            bail!("config: agent {name:?} missing hostname");
        }
        if self.backend.is_empty() {
            bail!("config: agent {name:?} missing backend");
        }
        url::Url::parse(&self.backend)
            .with_context(|| format!("config: agent {name:?} invalid backend URL"))?;

        let managed = matches!(self.policy, PolicyKind::OnDemand | PolicyKind::AlwaysOn);
        if managed {
            if self.container.name.is_empty() {
                bail!(
                    "config: agent {name:?} with {} policy requires container.name",
                    self.policy
                );
            }
            if self.health.url.is_empty() {
                bail!(
                    "config: agent {name:?} with {} policy requires health.url",
                    self.policy
                );
            }
        }
        if self.policy == PolicyKind::OnDemand
            && self.idle.timeout.unwrap_or(Duration::ZERO) == Duration::ZERO
        {
            bail!("config: agent {name:?} with on-demand policy requires idle.timeout > 0");
        }

        for host in self.all_hostnames() {
            if host.is_empty() {
                continue;
            }
            security::validate_hostname(host)
                .with_context(|| format!("config: agent {name:?} hostname {host:?}"))?;
        }

        if !self.health.url.is_empty() {
            security::validate_health_url(&self.health.url)
                .with_context(|| format!("config: agent {name:?} invalid health URL"))?;
        }
        Ok(())
    }
}

impl WarrenConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {:?}", path.as_ref()))?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("failed to parse config YAML")?;
        Ok(config)
    }

    /// Load and validate in one step; the usual entry point for `serve`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::from_yaml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            bail!("config: no agents defined");
        }

        let mut hostnames: HashMap<&str, &str> = HashMap::new(); // hostname -> agent name
        for (name, agent) in &self.agents {
            agent.validate(name)?;
            for host in agent.all_hostnames() {
                if host.is_empty() {
                    continue;
                }
                if let Some(prev) = hostnames.insert(host, name) {
                    bail!("config: duplicate hostname {host:?} (agents {prev:?} and {name:?})");
                }
            }
        }

        for (i, webhook) in self.webhooks.iter().enumerate() {
            security::validate_webhook_url(&webhook.url)
                .with_context(|| format!("config: webhook[{i}] invalid URL {:?}", webhook.url))?;
        }

        Ok(())
    }
}

fn default_listen() -> String {
    ":8080".to_string()
}

fn default_admin_listen() -> String {
    ":9090".to_string()
}
