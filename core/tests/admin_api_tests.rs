// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Admin API tests over a real listener, with unmanaged agents so no Docker
//! daemon is involved.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use warren_core::application::registry::Registry;
use warren_core::domain::config::{AgentConfig, ContainerConfig, HealthConfig, IdleConfig};
use warren_core::domain::events::{Event, EventKind};
use warren_core::domain::policy::PolicyKind;
use warren_core::infrastructure::event_bus::Emitter;
use warren_core::presentation::{admin, AppState};

fn unmanaged_agent(hostname: &str) -> AgentConfig {
    AgentConfig {
        hostname: hostname.to_string(),
        hostnames: Vec::new(),
        backend: "http://backend:18790".to_string(),
        policy: PolicyKind::Unmanaged,
        container: ContainerConfig::default(),
        health: HealthConfig::default(),
        idle: IdleConfig::default(),
        startup_timeout: None,
        max_restart_attempts: None,
    }
}

async fn spawn_admin() -> (Arc<AppState>, String, CancellationToken) {
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::new(
        Arc::new(Registry::new()),
        Emitter::new(64),
        None,
        shutdown.clone(),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = admin::router(Arc::clone(&state));
    let token = shutdown.clone();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .unwrap();
    });

    (state, format!("http://{addr}"), shutdown)
}

#[tokio::test]
async fn test_agent_listing_and_inspection() {
    let (state, base, shutdown) = spawn_admin().await;
    state.add_agent("web", unmanaged_agent("web.example.com")).await.unwrap();

    let client = reqwest::Client::new();

    let agents: serde_json::Value = client
        .get(format!("{base}/admin/agents"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let agents = agents.as_array().unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["name"], "web");
    assert_eq!(agents[0]["hostname"], "web.example.com");
    assert_eq!(agents[0]["policy"], "unmanaged");
    assert_eq!(agents[0]["state"], "ready");

    let detail: serde_json::Value = client
        .get(format!("{base}/admin/agents/web"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["backend"], "http://backend:18790");

    let missing = client
        .get(format!("{base}/admin/agents/ghost"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    shutdown.cancel();
}

#[tokio::test]
async fn test_add_agent_conflict_and_remove() {
    let (state, base, shutdown) = spawn_admin().await;
    state.add_agent("web", unmanaged_agent("web.example.com")).await.unwrap();

    let client = reqwest::Client::new();

    // Duplicate name -> 409.
    let conflict = client
        .post(format!("{base}/admin/agents"))
        .json(&serde_json::json!({
            "name": "web",
            "hostname": "other.example.com",
            "backend": "http://b:1",
            "policy": "unmanaged",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(conflict.status(), 409);

    // New unmanaged agent through the API.
    let created = client
        .post(format!("{base}/admin/agents"))
        .json(&serde_json::json!({
            "name": "api",
            "hostname": "api.example.com",
            "backend": "http://b:1",
            "policy": "unmanaged",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 200);
    assert!(state.agent("api").is_some());
    assert!(state.registry.lookup("api.example.com").is_some());

    // Remove drops both the agent and its routes.
    let removed = client
        .delete(format!("{base}/admin/agents/api"))
        .send()
        .await
        .unwrap();
    assert_eq!(removed.status(), 200);
    assert!(state.agent("api").is_none());
    assert!(state.registry.lookup("api.example.com").is_none());

    let missing = client
        .delete(format!("{base}/admin/agents/api"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    shutdown.cancel();
}

#[tokio::test]
async fn test_dynamic_services() {
    let (state, base, shutdown) = spawn_admin().await;
    state.add_agent("web", unmanaged_agent("web.example.com")).await.unwrap();

    let client = reqwest::Client::new();

    let created = client
        .post(format!("{base}/api/services"))
        .json(&serde_json::json!({
            "hostname": "svc.example.com",
            "target": "http://10.0.0.5:3000",
            "agent": "web",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 200);

    // Config-owned routes are not listed as dynamic; the new one is.
    let services: serde_json::Value = client
        .get(format!("{base}/admin/services"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let services = services.as_array().unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0]["hostname"], "svc.example.com");
    assert_eq!(services[0]["agent"], "web");

    // Unsafe target rejected.
    let rejected = client
        .post(format!("{base}/api/services"))
        .json(&serde_json::json!({
            "hostname": "bad.example.com",
            "target": "file:///etc/passwd",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), 400);

    let removed = client
        .delete(format!("{base}/api/services/svc.example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(removed.status(), 200);
    assert!(state.registry.lookup("svc.example.com").is_none());

    shutdown.cancel();
}

#[tokio::test]
async fn test_health_counters() {
    let (state, base, shutdown) = spawn_admin().await;
    state.add_agent("a", unmanaged_agent("a.example.com")).await.unwrap();
    state.add_agent("b", unmanaged_agent("b.example.com")).await.unwrap();

    let health: serde_json::Value = reqwest::Client::new()
        .get(format!("{base}/admin/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(health["agent_count"], 2);
    assert_eq!(health["ready_count"], 2);
    assert_eq!(health["sleeping_count"], 0);
    assert_eq!(health["service_count"], 0);

    shutdown.cancel();
}

#[tokio::test]
async fn test_event_stream_delivers_bus_events() {
    let (state, base, shutdown) = spawn_admin().await;

    let response = reqwest::Client::new()
        .get(format!("{base}/admin/events"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Give the SSE handler a moment to subscribe, then publish.
    tokio::time::sleep(Duration::from_millis(50)).await;
    state
        .emitter
        .emit(Event::new(EventKind::Degraded, "web").with_detail("probe failed"));

    let read_first_event = async {
        use futures::StreamExt;
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            buffer.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
            if let Some(line) = buffer.lines().find(|l| l.starts_with("data: ")) {
                return line.trim_start_matches("data: ").to_string();
            }
        }
        panic!("stream ended without an event");
    };

    let data = tokio::time::timeout(Duration::from_secs(2), read_first_event)
        .await
        .expect("timed out waiting for SSE event");
    let event: serde_json::Value = serde_json::from_str(&data).unwrap();
    assert_eq!(event["type"], "agent.degraded");
    assert_eq!(event["agent"], "web");
    assert_eq!(event["detail"], "probe failed");

    shutdown.cancel();
}
