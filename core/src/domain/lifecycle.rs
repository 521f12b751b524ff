// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Container state as reported by the runtime.
///
/// `Missing` means the container does not exist; `Unknown` means the driver
/// could not determine the state (inspection errors map here rather than
/// forcing a policy transition).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    Exited,
    Missing,
    Unknown,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to inspect container: {0}")]
    InspectFailed(String),
    #[error("failed to start container: {0}")]
    StartFailed(String),
    #[error("failed to stop container: {0}")]
    StopFailed(String),
}

/// Start/stop/inspect contract a lifecycle policy drives a container through.
///
/// `start` returns once the runtime has accepted the start; readiness is the
/// health prober's job, not the driver's. `stop` requests a graceful stop and
/// escalates to a kill after `grace`, returning once the container is
/// confirmed not running.
#[async_trait]
pub trait LifecycleDriver: Send + Sync {
    async fn status(&self) -> Result<ContainerStatus, LifecycleError>;
    async fn start(&self) -> Result<(), LifecycleError>;
    async fn stop(&self, grace: Duration) -> Result<(), LifecycleError>;
}
