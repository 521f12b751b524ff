// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Shared orchestrator state behind the proxy and admin surfaces: the live
// agent set, their policy handles, and the routing registry.

use crate::application::always_on::{AlwaysOn, AlwaysOnConfig};
use crate::application::on_demand::{OnDemand, OnDemandConfig};
use crate::application::registry::Registry;
use crate::application::unmanaged::Unmanaged;
use crate::domain::activity::ActivityTracker;
use crate::domain::config::AgentConfig;
use crate::domain::lifecycle::{ContainerStatus, LifecycleDriver};
use crate::domain::policy::{AgentPolicy, PolicyKind};
use crate::infrastructure::docker::DockerLifecycle;
use crate::infrastructure::event_bus::Emitter;
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One live agent: its policy handle plus the shared activity view the
/// proxy writes into.
pub struct AgentEntry {
    pub name: String,
    pub config: AgentConfig,
    pub policy_kind: PolicyKind,
    pub policy: Arc<dyn AgentPolicy>,
    pub activity: Arc<ActivityTracker>,
    /// Cancels this agent's control loop without touching the rest of the
    /// process.
    pub token: CancellationToken,
}

pub struct AppState {
    pub registry: Arc<Registry>,
    pub emitter: Emitter,
    pub started_at: Instant,
    pub shutdown: CancellationToken,
    docker: Option<bollard::Docker>,
    agents: RwLock<HashMap<String, Arc<AgentEntry>>>,
}

impl AppState {
    pub fn new(
        registry: Arc<Registry>,
        emitter: Emitter,
        docker: Option<bollard::Docker>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            emitter,
            started_at: Instant::now(),
            shutdown,
            docker,
            agents: RwLock::new(HashMap::new()),
        }
    }

    pub fn agent(&self, name: &str) -> Option<Arc<AgentEntry>> {
        self.agents.read().unwrap().get(name).cloned()
    }

    pub fn agents(&self) -> Vec<Arc<AgentEntry>> {
        let mut entries: Vec<_> = self.agents.read().unwrap().values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn total_connections(&self) -> usize {
        self.agents
            .read()
            .unwrap()
            .values()
            .map(|e| e.activity.active_connections())
            .sum()
    }

    /// Builds the policy for an agent, spawns its control loop, and
    /// registers its routes. Boot state for on-demand agents is derived
    /// from the container runtime's view, never persisted.
    pub async fn add_agent(&self, name: &str, config: AgentConfig) -> Result<()> {
        config.validate(name)?;
        if self.agents.read().unwrap().contains_key(name) {
            bail!("agent {name:?} already exists");
        }

        let activity = Arc::new(ActivityTracker::new());
        let policy: Arc<dyn AgentPolicy> = match config.policy {
            PolicyKind::OnDemand => {
                let driver = self.driver_for(&config)?;
                let running = matches!(driver.status().await, Ok(ContainerStatus::Running));
                let controller = Arc::new(OnDemand::new(
                    driver,
                    on_demand_config(name, &config),
                    Arc::clone(&activity),
                    self.emitter.clone(),
                )?);
                controller.set_initial_state(running);
                controller
            }
            PolicyKind::AlwaysOn => Arc::new(AlwaysOn::new(
                AlwaysOnConfig {
                    agent: name.to_string(),
                    health_url: config.health.url.clone(),
                    check_interval: config.check_interval(),
                    max_failures: config.max_failures(),
                },
                self.emitter.clone(),
            )),
            PolicyKind::Unmanaged => Arc::new(Unmanaged),
        };

        // Routes first; a partial registration is rolled back before the
        // agent becomes visible anywhere.
        let mut registered: Vec<String> = Vec::new();
        for host in config.all_hostnames() {
            if host.is_empty() {
                continue;
            }
            if let Err(e) = self.registry.register(host, &config.backend, name) {
                for done in &registered {
                    self.registry.deregister(done);
                }
                return Err(e).with_context(|| format!("failed to register route for {name:?}"));
            }
            registered.push(host.to_string());
        }

        let token = self.shutdown.child_token();
        let entry = Arc::new(AgentEntry {
            name: name.to_string(),
            policy_kind: config.policy,
            policy: Arc::clone(&policy),
            activity,
            token: token.clone(),
            config,
        });
        {
            let mut agents = self.agents.write().unwrap();
            // Re-check under the write lock; a concurrent add may have won.
            if agents.contains_key(name) {
                drop(agents);
                for done in &registered {
                    self.registry.deregister(done);
                }
                bail!("agent {name:?} already exists");
            }
            agents.insert(name.to_string(), Arc::clone(&entry));
        }

        tokio::spawn(async move {
            policy.run(token).await;
        });

        info!(agent = name, policy = %entry.policy_kind, hostname = %entry.config.hostname, "agent added");
        Ok(())
    }

    /// Stops the agent's control loop and drops its routes.
    pub fn remove_agent(&self, name: &str) -> bool {
        let Some(entry) = self.agents.write().unwrap().remove(name) else {
            return false;
        };
        entry.token.cancel();
        self.registry.deregister_agent(name);
        info!(agent = name, "agent removed");
        true
    }

    fn driver_for(&self, config: &AgentConfig) -> Result<Arc<dyn LifecycleDriver>> {
        let docker = self
            .docker
            .clone()
            .context("managed policies require a Docker connection")?;
        Ok(Arc::new(DockerLifecycle::new(
            docker,
            config.container.name.clone(),
            config.container.image.clone(),
        )))
    }
}

fn on_demand_config(name: &str, config: &AgentConfig) -> OnDemandConfig {
    OnDemandConfig {
        agent: name.to_string(),
        container_name: config.container.name.clone(),
        hostname: config.hostname.clone(),
        health_url: config.health.url.clone(),
        check_interval: config.check_interval(),
        startup_timeout: config.startup_timeout(),
        idle_timeout: config.idle.timeout.unwrap_or_default(),
        wake_cooldown: config.wake_cooldown(),
        max_failures: config.max_failures(),
        max_restart_attempts: config.max_restart_attempts(),
        stop_grace: config.stop_grace(),
    }
}
