// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::agent::AgentState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Which lifecycle policy manages an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    OnDemand,
    AlwaysOn,
    Unmanaged,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::OnDemand => "on-demand",
            PolicyKind::AlwaysOn => "always-on",
            PolicyKind::Unmanaged => "unmanaged",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-agent lifecycle policy.
///
/// The reverse proxy calls `on_request` on the hot path, so implementations
/// must never block there: update a stamp, schedule work, or do nothing.
/// `run` is the policy's long-lived control loop; it exits when the token is
/// cancelled and issues no further container calls afterwards.
#[async_trait]
pub trait AgentPolicy: Send + Sync {
    fn state(&self) -> AgentState;

    /// Non-blocking data-path hook, invoked for every proxied request.
    fn on_request(&self);

    /// Admin-initiated wake. Bypasses the wake cooldown; a no-op for
    /// policies without a sleep state.
    fn request_wake(&self) {}

    /// Admin-initiated sleep. A no-op for policies without a sleep state.
    fn request_sleep(&self) {}

    async fn run(&self, shutdown: CancellationToken);

    /// Read-only snapshot for the admin API. Policies with counters and
    /// stamps extend the default state-only view.
    fn introspect(&self) -> serde_json::Value {
        serde_json::json!({ "state": self.state() })
    }
}
