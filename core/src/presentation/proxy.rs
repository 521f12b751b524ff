// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Reverse proxy front.
//!
//! Routes on the Host header, reports request activity to the agent's
//! policy, waits (bounded) for a sleeping agent to wake, then streams the
//! request through to the backend. Streamed responses hold a connection
//! guard so live long connections inhibit idle-sleep.

use crate::presentation::{normalize_listen_addr, AgentEntry, AppState};
use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long a request will wait for a sleeping agent to become ready
/// before giving up with 503.
const WAKE_WAIT_TIMEOUT: Duration = Duration::from_secs(15);
const WAKE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// RFC 9110 connection-scoped headers that must not be forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Clone)]
struct ProxyState {
    app: Arc<AppState>,
    client: reqwest::Client,
}

pub fn router(app: Arc<AppState>) -> Router {
    let state = ProxyState {
        app,
        client: reqwest::Client::new(),
    };
    Router::new().fallback(handle).with_state(state)
}

pub async fn serve(app: Arc<AppState>, listen: &str, shutdown: CancellationToken) -> Result<()> {
    let addr = normalize_listen_addr(listen);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind proxy to {addr}"))?;
    info!(addr = %addr, "reverse proxy listening");

    axum::serve(listener, router(app))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("proxy server failed")
}

async fn handle(State(state): State<ProxyState>, req: Request) -> Response {
    let Some(host) = request_host(req.headers()) else {
        return error_response(StatusCode::BAD_REQUEST, "missing Host header");
    };

    let Some(service) = state.app.registry.lookup(&host) else {
        debug!(host = %host, "no route for host");
        return error_response(StatusCode::NOT_FOUND, "unknown host");
    };

    let entry = state.app.agent(&service.agent);
    if let Some(entry) = &entry {
        entry.activity.mark_request();
        entry.policy.on_request();

        if !await_ready(entry).await {
            warn!(agent = %entry.name, host = %host, "agent not ready, rejecting request");
            let mut response =
                error_response(StatusCode::SERVICE_UNAVAILABLE, "agent is not ready");
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("5"));
            return response;
        }
    }

    forward(&state, req, &service.target, &host, entry).await
}

/// Polls the policy until it reports ready, bounded by the wake deadline.
/// Unmanaged backends are always ready and pass straight through.
async fn await_ready(entry: &Arc<AgentEntry>) -> bool {
    let deadline = Instant::now() + WAKE_WAIT_TIMEOUT;
    loop {
        if entry.policy.state().is_up() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(WAKE_POLL_INTERVAL).await;
    }
}

async fn forward(
    state: &ProxyState,
    req: Request,
    target: &url::Url,
    host: &str,
    entry: Option<Arc<AgentEntry>>,
) -> Response {
    let mut url = target.clone();
    url.set_path(req.uri().path());
    url.set_query(req.uri().query());

    let method = req.method().clone();
    let mut headers = req.headers().clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    if let Ok(value) = HeaderValue::from_str(host) {
        headers.insert("x-forwarded-host", value);
    }

    let body = reqwest::Body::wrap_stream(req.into_body().into_data_stream());
    let upstream = state
        .client
        .request(method, url)
        .headers(headers)
        .body(body)
        .send()
        .await;

    let upstream = match upstream {
        Ok(response) => response,
        Err(e) => {
            warn!(host = %host, error = %e, "backend request failed");
            return error_response(StatusCode::BAD_GATEWAY, "backend unreachable");
        }
    };

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    strip_hop_by_hop(&mut response_headers);

    // The guard rides inside the body stream: the connection counts as live
    // until the response is fully streamed or the client goes away.
    let guard = entry.map(|e| e.activity.connection_guard());
    let stream = upstream.bytes_stream().map(move |chunk| {
        let _ = &guard;
        chunk
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}

fn request_host(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::HOST)?.to_str().ok()?;
    // Strip the port; IPv6 literals keep their brackets.
    let host = if raw.starts_with('[') {
        raw.split(']').next().map(|h| format!("{h}]"))?
    } else {
        raw.split(':').next()?.to_string()
    };
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        axum::Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_host(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_request_host_strips_port() {
        assert_eq!(
            request_host(&headers_with_host("app.example.com:8080")).as_deref(),
            Some("app.example.com")
        );
        assert_eq!(
            request_host(&headers_with_host("app.example.com")).as_deref(),
            Some("app.example.com")
        );
    }

    #[test]
    fn test_request_host_missing() {
        assert_eq!(request_host(&HeaderMap::new()), None);
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("x-custom", HeaderValue::from_static("kept"));
        strip_hop_by_hop(&mut headers);
        assert!(headers.get("connection").is_none());
        assert!(headers.get("transfer-encoding").is_none());
        assert_eq!(headers.get("x-custom").unwrap(), "kept");
    }
}
