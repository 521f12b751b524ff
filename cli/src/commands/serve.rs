// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `warren serve` - wires and runs the orchestrator process.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warren_core::application::registry::Registry;
use warren_core::application::WebhookAlerter;
use warren_core::domain::config::WarrenConfig;
use warren_core::domain::policy::PolicyKind;
use warren_core::infrastructure::docker;
use warren_core::infrastructure::event_bus::Emitter;
use warren_core::presentation::{admin, proxy, AppState};

pub async fn run(config_path: PathBuf) -> Result<()> {
    let config = WarrenConfig::load(&config_path)
        .with_context(|| format!("failed to load {config_path:?}"))?;
    info!(
        config = %config_path.display(),
        agents = config.agents.len(),
        "configuration loaded"
    );

    // Only on-demand agents drive containers; always-on just health-polls,
    // so deployments without on-demand agents run without a Docker daemon.
    let needs_docker = config
        .agents
        .values()
        .any(|a| matches!(a.policy, PolicyKind::OnDemand));
    let docker_handle = if needs_docker {
        Some(docker::connect(None).context("failed to initialize Docker runtime")?)
    } else {
        None
    };

    let shutdown = CancellationToken::new();
    let registry = Arc::new(Registry::new());
    let emitter = Emitter::default();
    let state = Arc::new(AppState::new(
        Arc::clone(&registry),
        emitter.clone(),
        docker_handle,
        shutdown.clone(),
    ));

    // Deterministic startup order keeps logs and boot events stable.
    let mut names: Vec<_> = config.agents.keys().cloned().collect();
    names.sort();
    for name in names {
        let agent_config = config.agents[&name].clone();
        state
            .add_agent(&name, agent_config)
            .await
            .with_context(|| format!("failed to start agent {name:?}"))?;
    }

    if !config.webhooks.is_empty() {
        let alerter = Arc::new(WebhookAlerter::new(config.webhooks.clone()));
        alerter.start(&emitter, shutdown.clone());
        info!(webhooks = config.webhooks.len(), "webhook alerter started");
    }

    let admin_task = tokio::spawn({
        let state = Arc::clone(&state);
        let listen = config.admin_listen.clone();
        let token = shutdown.clone();
        async move { admin::serve(state, &listen, token).await }
    });
    let proxy_task = tokio::spawn({
        let state = Arc::clone(&state);
        let listen = config.listen.clone();
        let token = shutdown.clone();
        async move { proxy::serve(state, &listen, token).await }
    });

    shutdown_signal().await;
    info!("shutdown signal received, draining");
    shutdown.cancel();

    for (name, task) in [("admin", admin_task), ("proxy", proxy_task)] {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(server = name, error = %e, "server exited with error"),
            Err(e) => warn!(server = name, error = %e, "server task panicked"),
        }
    }

    info!("orchestrator stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
