// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle transition kinds published on the event bus and delivered to
/// webhook subscribers. The wire names are the dotted strings used in
/// webhook event filters (`agent.ready`, `agent.degraded`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "agent.starting")]
    Starting,
    #[serde(rename = "agent.ready")]
    Ready,
    #[serde(rename = "agent.sleeping")]
    Sleeping,
    #[serde(rename = "agent.waking")]
    Waking,
    #[serde(rename = "agent.stopping")]
    Stopping,
    #[serde(rename = "agent.degraded")]
    Degraded,
    #[serde(rename = "agent.restart_attempt")]
    RestartAttempt,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Starting => "agent.starting",
            EventKind::Ready => "agent.ready",
            EventKind::Sleeping => "agent.sleeping",
            EventKind::Waking => "agent.waking",
            EventKind::Stopping => "agent.stopping",
            EventKind::Degraded => "agent.degraded",
            EventKind::RestartAttempt => "agent.restart_attempt",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lifecycle transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub agent: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind, agent: impl Into<String>) -> Self {
        Self {
            kind,
            agent: agent.into(),
            timestamp: Utc::now(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
