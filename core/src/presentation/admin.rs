// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Admin HTTP API: agent and dynamic-service management, orchestrator
//! health, and the SSE event stream.

use crate::domain::config::{AgentConfig, ContainerConfig, HealthConfig, IdleConfig};
use crate::domain::policy::PolicyKind;
use crate::presentation::{normalize_listen_addr, AppState};
use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/admin/health", get(health))
        .route("/admin/agents", get(list_agents).post(add_agent))
        .route(
            "/admin/agents/:name",
            get(inspect_agent).delete(remove_agent),
        )
        .route("/admin/agents/:name/wake", post(wake_agent))
        .route("/admin/agents/:name/sleep", post(sleep_agent))
        .route("/admin/services", get(list_services))
        .route("/api/services", post(add_service))
        .route("/api/services/:hostname", axum::routing::delete(remove_service))
        .route("/admin/events", get(stream_events))
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, listen: &str, shutdown: CancellationToken) -> Result<()> {
    let addr = normalize_listen_addr(listen);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind admin API to {addr}"))?;
    info!(addr = %addr, "admin API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("admin server failed")
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let agents = state.agents();
    let ready = agents.iter().filter(|a| a.policy.state().is_up()).count();
    let sleeping = agents
        .iter()
        .filter(|a| a.policy.state() == crate::domain::agent::AgentState::Sleeping)
        .count();

    Json(json!({
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "agent_count": agents.len(),
        "ready_count": ready,
        "sleeping_count": sleeping,
        "ws_connections": state.total_connections(),
        "service_count": state.registry.list_dynamic().len(),
    }))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let agents: Vec<_> = state
        .agents()
        .iter()
        .map(|entry| {
            json!({
                "name": entry.name,
                "hostname": entry.config.hostname,
                "policy": entry.policy_kind,
                "state": entry.policy.state(),
                "connections": entry.activity.active_connections(),
            })
        })
        .collect();
    Json(json!(agents))
}

async fn inspect_agent(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let Some(entry) = state.agent(&name) else {
        return not_found("agent not found");
    };

    let mut body = json!({
        "name": entry.name,
        "hostname": entry.config.hostname,
        "hostnames": entry.config.hostnames,
        "backend": entry.config.backend,
        "policy": entry.policy_kind,
        "state": entry.policy.state(),
        "connections": entry.activity.active_connections(),
    });
    // Merge policy-specific counters and stamps.
    if let (Some(map), serde_json::Value::Object(extra)) =
        (body.as_object_mut(), entry.policy.introspect())
    {
        for (key, value) in extra {
            map.entry(key).or_insert(value);
        }
    }
    (StatusCode::OK, Json(body))
}

#[derive(Deserialize)]
struct AddAgentRequest {
    name: String,
    hostname: String,
    backend: String,
    policy: PolicyKind,
    #[serde(default)]
    container_name: String,
    #[serde(default)]
    health_url: String,
    #[serde(default, with = "humantime_serde")]
    idle_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    wake_cooldown: Option<Duration>,
}

async fn add_agent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddAgentRequest>,
) -> impl IntoResponse {
    if state.agent(&req.name).is_some() {
        return (
            StatusCode::CONFLICT,
            Json(json!({"error": "agent already exists"})),
        );
    }

    let config = AgentConfig {
        hostname: req.hostname,
        hostnames: Vec::new(),
        backend: req.backend,
        policy: req.policy,
        container: ContainerConfig {
            name: req.container_name,
            image: None,
            stop_grace: None,
        },
        health: HealthConfig {
            url: req.health_url,
            interval: None,
            max_failures: None,
        },
        idle: IdleConfig {
            timeout: req.idle_timeout,
            wake_cooldown: req.wake_cooldown,
        },
        startup_timeout: None,
        max_restart_attempts: None,
    };

    match state.add_agent(&req.name, config).await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "created"}))),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("{e:#}")})),
        ),
    }
}

async fn remove_agent(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if state.remove_agent(&name) {
        (StatusCode::OK, Json(json!({"status": "removed"})))
    } else {
        not_found("agent not found")
    }
}

async fn wake_agent(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let Some(entry) = state.agent(&name) else {
        return not_found("agent not found");
    };
    entry.policy.request_wake();
    (StatusCode::OK, Json(json!({"status": "waking"})))
}

async fn sleep_agent(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let Some(entry) = state.agent(&name) else {
        return not_found("agent not found");
    };
    entry.policy.request_sleep();
    (StatusCode::OK, Json(json!({"status": "sleeping"})))
}

async fn list_services(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let services: Vec<_> = state
        .registry
        .list_dynamic()
        .iter()
        .map(|svc| {
            json!({
                "hostname": svc.hostname,
                "target": svc.target.as_str(),
                "agent": svc.agent,
            })
        })
        .collect();
    Json(json!(services))
}

#[derive(Deserialize)]
struct AddServiceRequest {
    hostname: String,
    target: String,
    #[serde(default)]
    agent: String,
}

async fn add_service(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddServiceRequest>,
) -> impl IntoResponse {
    match state
        .registry
        .register_dynamic(&req.hostname, &req.target, &req.agent)
    {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "created"}))),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": e.to_string()})),
        ),
    }
}

async fn remove_service(
    State(state): State<Arc<AppState>>,
    Path(hostname): Path<String>,
) -> impl IntoResponse {
    if state.registry.deregister(&hostname) {
        (StatusCode::OK, Json(json!({"status": "removed"})))
    } else {
        not_found("service not found")
    }
}

async fn stream_events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut receiver = state.emitter.subscribe();
    let stream = async_stream::stream! {
        while let Some(event) = receiver.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok::<_, axum::Error>(SseEvent::default().data(data));
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn not_found(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({"error": message})))
}
