// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for the orchestrator admin API.

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;

pub const DEFAULT_ADMIN_URL: &str = "http://localhost:9090";

/// Resolution order: --admin flag, WARREN_ADMIN, ~/.warren/config.yaml,
/// built-in default.
pub fn resolve_admin_url(flag: Option<String>) -> String {
    flag.filter(|s| !s.is_empty())
        .or_else(|| std::env::var("WARREN_ADMIN").ok().filter(|s| !s.is_empty()))
        .or_else(admin_url_from_config)
        .unwrap_or_else(|| DEFAULT_ADMIN_URL.to_string())
}

fn admin_url_from_config() -> Option<String> {
    #[derive(Deserialize)]
    struct CliConfig {
        admin: Option<String>,
    }

    let path = dirs::home_dir()?.join(".warren").join("config.yaml");
    let content = std::fs::read_to_string(path).ok()?;
    serde_yaml::from_str::<CliConfig>(&content).ok()?.admin
}

#[derive(Debug, Clone)]
pub struct AdminClient {
    client: Client,
    base_url: String,
}

impl AdminClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            // No global timeout: the events stream is long-lived.
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        self.request_json(Method::GET, path, None).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        self.request_json(Method::POST, path, body).await
    }

    pub async fn delete_json(&self, path: &str) -> Result<serde_json::Value> {
        self.request_json(Method::DELETE, path, None).await
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("failed to reach admin API at {url}"))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("admin API returned {}: {}", status.as_u16(), error_message(&text));
        }

        // Some endpoints legitimately return non-JSON; surface that as null
        // rather than failing the command.
        Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::Null))
    }

    /// Streams `/admin/events`, invoking the callback for every SSE data
    /// payload until the server closes the stream.
    pub async fn stream_events(&self, mut on_event: impl FnMut(&str)) -> Result<()> {
        let url = format!("{}/admin/events", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to connect to event stream at {url}"))?;

        let status = response.status();
        if status != StatusCode::OK {
            bail!("admin API returned {}", status.as_u16());
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("failed to read event stream")?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim_end().to_string();
                buffer.drain(..=pos);
                if let Some(data) = line.strip_prefix("data: ") {
                    on_event(data);
                }
            }
        }
        Ok(())
    }
}

fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.to_string())
}
