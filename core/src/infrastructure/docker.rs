// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::lifecycle::{ContainerStatus, LifecycleDriver, LifecycleError};
use async_trait::async_trait;
use bollard::container::{Config, CreateContainerOptions, StartContainerOptions, StopContainerOptions};
use bollard::errors::Error as BollardError;
use bollard::models::ContainerStateStatusEnum;
use bollard::Docker;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connect to the Docker daemon (custom socket or auto-detect).
pub fn connect(socket_path: Option<&str>) -> Result<Docker, LifecycleError> {
    let docker = if let Some(path) = socket_path {
        #[cfg(unix)]
        let result = Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION);

        #[cfg(windows)]
        let result = Docker::connect_with_named_pipe(path, 120, bollard::API_DEFAULT_VERSION);

        result.map_err(|e| {
            LifecycleError::InspectFailed(format!("failed to connect to Docker at {path}: {e}"))
        })?
    } else {
        Docker::connect_with_local_defaults().map_err(|e| {
            LifecycleError::InspectFailed(format!(
                "failed to connect to Docker: {e} (is the daemon running?)"
            ))
        })?
    };
    Ok(docker)
}

/// Docker-backed lifecycle driver for a single named container.
///
/// Warren manages containers deployed out of band (compose stacks, mostly),
/// so `start` normally just starts the existing container. When an image is
/// configured, a missing container is created first.
pub struct DockerLifecycle {
    docker: Docker,
    container_name: String,
    image: Option<String>,
}

impl DockerLifecycle {
    pub fn new(docker: Docker, container_name: impl Into<String>, image: Option<String>) -> Self {
        Self {
            docker,
            container_name: container_name.into(),
            image,
        }
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    async fn create_container(&self) -> Result<(), LifecycleError> {
        let image = self.image.as_ref().ok_or_else(|| {
            LifecycleError::StartFailed(format!(
                "container {:?} does not exist and no image is configured",
                self.container_name
            ))
        })?;

        info!(container = %self.container_name, image = %image, "creating container");
        let options = CreateContainerOptions {
            name: self.container_name.clone(),
            platform: None,
        };
        let config = Config {
            image: Some(image.clone()),
            ..Default::default()
        };
        self.docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| LifecycleError::StartFailed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl LifecycleDriver for DockerLifecycle {
    async fn status(&self) -> Result<ContainerStatus, LifecycleError> {
        match self.docker.inspect_container(&self.container_name, None).await {
            Ok(inspect) => {
                let state = inspect.state.and_then(|s| s.status);
                Ok(map_container_state(state))
            }
            Err(e) if is_not_found(&e) => Ok(ContainerStatus::Missing),
            Err(e) => Err(LifecycleError::InspectFailed(e.to_string())),
        }
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        let result = self
            .docker
            .start_container(&self.container_name, None::<StartContainerOptions<String>>)
            .await;

        match result {
            Ok(()) => {
                info!(container = %self.container_name, "container started");
                Ok(())
            }
            // 304: already running, which is what we wanted.
            Err(e) if is_not_modified(&e) => {
                debug!(container = %self.container_name, "container already running");
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                self.create_container().await?;
                self.docker
                    .start_container(&self.container_name, None::<StartContainerOptions<String>>)
                    .await
                    .map_err(|e| LifecycleError::StartFailed(e.to_string()))?;
                info!(container = %self.container_name, "container created and started");
                Ok(())
            }
            Err(e) => Err(LifecycleError::StartFailed(e.to_string())),
        }
    }

    async fn stop(&self, grace: Duration) -> Result<(), LifecycleError> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        match self.docker.stop_container(&self.container_name, Some(options)).await {
            Ok(()) => {
                info!(container = %self.container_name, "container stopped");
                Ok(())
            }
            Err(e) if is_not_modified(&e) => {
                debug!(container = %self.container_name, "container already stopped");
                Ok(())
            }
            // Nothing to stop; confirmed not running.
            Err(e) if is_not_found(&e) => {
                warn!(container = %self.container_name, "stop requested for missing container");
                Ok(())
            }
            Err(e) => Err(LifecycleError::StopFailed(e.to_string())),
        }
    }
}

fn map_container_state(state: Option<ContainerStateStatusEnum>) -> ContainerStatus {
    match state {
        Some(ContainerStateStatusEnum::RUNNING) | Some(ContainerStateStatusEnum::RESTARTING) => {
            ContainerStatus::Running
        }
        Some(ContainerStateStatusEnum::CREATED)
        | Some(ContainerStateStatusEnum::PAUSED)
        | Some(ContainerStateStatusEnum::EXITED)
        | Some(ContainerStateStatusEnum::REMOVING)
        | Some(ContainerStateStatusEnum::DEAD) => ContainerStatus::Exited,
        _ => ContainerStatus::Unknown,
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError { status_code: 404, .. }
    )
}

fn is_not_modified(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError { status_code: 304, .. }
    )
}
