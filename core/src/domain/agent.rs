// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a managed agent, as observed by its policy.
///
/// `Starting` is the boot-time synonym of `Waking`: it is entered when the
/// process starts with a container that is expected to be running but has
/// not yet passed a health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Unknown,
    Starting,
    Ready,
    Sleeping,
    Waking,
    Stopping,
    Degraded,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Unknown => "unknown",
            AgentState::Starting => "starting",
            AgentState::Ready => "ready",
            AgentState::Sleeping => "sleeping",
            AgentState::Waking => "waking",
            AgentState::Stopping => "stopping",
            AgentState::Degraded => "degraded",
        }
    }

    /// States in which the policy believes the container should be serving.
    pub fn is_up(&self) -> bool {
        matches!(self, AgentState::Ready)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
