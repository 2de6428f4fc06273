// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Docker container runtime.
//!
//! Implements [`ContainerRuntime`] over the Docker Engine API using `bollard`.
//! Containers are created with stdin held open so lines published on an
//! instance's terminal input reach the server process.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::models::{
    ContainerCreateBody, ContainerStateStatusEnum, CreateImageInfo, HostConfig,
    PortBinding as DockerPortBinding,
};
use bollard::query_parameters::{
    AttachContainerOptionsBuilder, CreateContainerOptionsBuilder, CreateImageOptionsBuilder,
    InspectContainerOptions, KillContainerOptionsBuilder, ListContainersOptionsBuilder,
    ListImagesOptions, StartContainerOptions, StopContainerOptions,
};
use futures::StreamExt;
use stevedore_core::runtime::{
    Attachment, ContainerRuntime, ContainerSpec, ContainerState, ContainerSummary, ImageSummary,
    PullProgress, PullStream, Result, RuntimeError,
};
use tokio_util::io::StreamReader;
use tracing::{debug, info};

/// Container runtime backed by a Docker daemon.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Wrap an existing client.
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect using `DOCKER_HOST` or the platform's default socket.
    pub fn connect() -> crate::error::Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::new(docker))
    }

    /// Check that the daemon answers.
    pub async fn ping(&self) -> crate::error::Result<()> {
        self.docker.ping().await?;
        Ok(())
    }
}

impl std::fmt::Debug for DockerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerRuntime").finish_non_exhaustive()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn runtime_type(&self) -> &'static str {
        "docker"
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptionsBuilder::new().all(true).build()))
            .await
            .map_err(api_error)?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                names: c.names.unwrap_or_default(),
                image: c.image.unwrap_or_default(),
            })
            .collect())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let images = self
            .docker
            .list_images(None::<ListImagesOptions>)
            .await
            .map_err(api_error)?;

        Ok(images
            .into_iter()
            .map(|i| ImageSummary {
                id: i.id,
                repo_tags: i.repo_tags,
                labels: i.labels,
            })
            .collect())
    }

    async fn pull_image(&self, image: &str) -> Result<PullStream> {
        let (from_image, tag) = split_reference(image);
        let mut options = CreateImageOptionsBuilder::new().from_image(from_image);
        if let Some(tag) = tag {
            options = options.tag(tag);
        }

        debug!(image = %image, "Pulling image");
        let stream = self
            .docker
            .create_image(Some(options.build()), None, None)
            .map(|record| match record {
                Ok(info) => Ok(pull_progress(info)),
                // bollard surfaces error records as stream errors
                Err(BollardError::DockerStreamError { error }) => Ok(PullProgress::error(error)),
                Err(e) => Err(api_error(e)),
            });

        Ok(stream.boxed())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptionsBuilder::new().name(&spec.name).build()),
                container_body(spec),
            )
            .await
            .map_err(api_error)?;

        info!(name = %spec.name, container_id = %response.id, image = %spec.image, "Created container");
        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions>)
            .await
            .map_err(|e| container_error(container_id, e))
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        self.docker
            .stop_container(container_id, None::<StopContainerOptions>)
            .await
            .map_err(|e| container_error(container_id, e))
    }

    async fn kill_container(&self, container_id: &str, signal: &str) -> Result<()> {
        self.docker
            .kill_container(
                container_id,
                Some(KillContainerOptionsBuilder::new().signal(signal).build()),
            )
            .await
            .map_err(|e| container_error(container_id, e))
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerState> {
        let inspect = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| container_error(container_id, e))?;

        Ok(container_state(
            inspect.state.and_then(|state| state.status),
        ))
    }

    async fn attach_container(&self, container_id: &str) -> Result<Attachment> {
        let results = self
            .docker
            .attach_container(
                container_id,
                Some(
                    AttachContainerOptionsBuilder::new()
                        .stream(true)
                        .stdin(true)
                        .stdout(true)
                        .stderr(true)
                        .build(),
                ),
            )
            .await
            .map_err(|e| container_error(container_id, e))?;

        let output = results
            .output
            .map(|chunk| chunk.map(|log| log.into_bytes()).map_err(std::io::Error::other));

        Ok(Attachment {
            output: Box::pin(StreamReader::new(output)),
            input: results.input,
        })
    }
}

/// Split an image reference into the `fromImage` and `tag` query values.
///
/// Digest references are passed whole. A reference without a tag pulls
/// `latest` rather than every tag of the repository.
fn split_reference(image: &str) -> (&str, Option<&str>) {
    if image.contains('@') {
        return (image, None);
    }
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (&image[..split], Some(&image[split + 1..]))
        }
        None => (image, Some("latest")),
    }
}

fn container_body(spec: &ContainerSpec) -> ContainerCreateBody {
    let mut exposed_ports = HashMap::new();
    let mut port_bindings: HashMap<String, Option<Vec<DockerPortBinding>>> = HashMap::new();
    for port in &spec.ports {
        exposed_ports.insert(port.container_port.clone(), HashMap::new());
        port_bindings
            .entry(port.container_port.clone())
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(DockerPortBinding {
                host_ip: None,
                host_port: Some(port.host_port.to_string()),
            });
    }

    ContainerCreateBody {
        image: Some(spec.image.clone()),
        env: (!spec.env.is_empty()).then(|| spec.env.clone()),
        exposed_ports: Some(exposed_ports),
        open_stdin: Some(true),
        attach_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        host_config: Some(HostConfig {
            port_bindings: Some(port_bindings),
            binds: Some(spec.binds.clone()),
            ..HostConfig::default()
        }),
        ..ContainerCreateBody::default()
    }
}

fn container_state(status: Option<ContainerStateStatusEnum>) -> ContainerState {
    match status {
        Some(ContainerStateStatusEnum::CREATED) => ContainerState::Created,
        Some(ContainerStateStatusEnum::RUNNING) => ContainerState::Running,
        Some(ContainerStateStatusEnum::PAUSED) => ContainerState::Paused,
        Some(ContainerStateStatusEnum::RESTARTING) => ContainerState::Restarting,
        Some(ContainerStateStatusEnum::REMOVING) => ContainerState::Removing,
        Some(ContainerStateStatusEnum::EXITED) => ContainerState::Exited,
        Some(ContainerStateStatusEnum::DEAD) => ContainerState::Dead,
        Some(ContainerStateStatusEnum::EMPTY) | None => ContainerState::Unknown(String::new()),
    }
}

fn pull_progress(info: CreateImageInfo) -> PullProgress {
    let error = info
        .error
        .or_else(|| info.error_detail.and_then(|detail| detail.message));
    PullProgress {
        status: info.status,
        progress: info.progress,
        error,
    }
}

fn api_error(err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError { message, .. } => RuntimeError::Api(message),
        other => RuntimeError::Unavailable(other.to_string()),
    }
}

fn container_error(container_id: &str, err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::ContainerNotFound(container_id.to_string()),
        other => api_error(other),
    }
}
