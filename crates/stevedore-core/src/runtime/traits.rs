// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container runtime trait definitions.
//!
//! Defines the command set the lifecycle engine drives. Implementations are
//! shared across all instances and must be safe to call concurrently.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Image label carrying the reference an image was built or pulled as.
pub const IMAGE_REF_LABEL: &str = "org.opencontainers.image.ref.name";

/// Signal used for [`Action::Kill`](crate::instance::Action::Kill).
pub const KILL_SIGNAL: &str = "SIGKILL";

/// Errors from container runtime calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// No container with the given ID exists.
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    /// The runtime could not be reached.
    #[error("Runtime unavailable: {0}")]
    Unavailable(String),

    /// The runtime rejected the request.
    #[error("Runtime API error: {0}")]
    Api(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// A container as returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    /// Runtime-assigned container ID.
    pub id: String,
    /// Container names. Docker reports them with a leading `/`.
    pub names: Vec<String>,
    /// Image reference the container was created from.
    pub image: String,
}

impl ContainerSummary {
    /// Whether the container carries `name`, ignoring Docker's leading slash.
    pub fn has_name(&self, name: &str) -> bool {
        self.names
            .iter()
            .any(|n| n.strip_prefix('/').unwrap_or(n) == name)
    }
}

/// A locally available image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSummary {
    /// Image ID.
    pub id: String,
    /// `repository:tag` references.
    pub repo_tags: Vec<String>,
    /// Image labels.
    pub labels: HashMap<String, String>,
}

impl ImageSummary {
    /// Whether this image satisfies the reference `image`.
    ///
    /// Checks the OCI reference label first, then the repo tags. A reference
    /// without a tag is treated as `:latest`.
    pub fn matches(&self, image: &str) -> bool {
        if self.labels.get(IMAGE_REF_LABEL).map(String::as_str) == Some(image) {
            return true;
        }
        let wanted = with_default_tag(image);
        self.repo_tags.iter().any(|tag| with_default_tag(tag) == wanted)
    }
}

fn with_default_tag(image: &str) -> String {
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    if last_segment.contains(':') || image.contains('@') {
        image.to_string()
    } else {
        format!("{}:latest", image)
    }
}

/// One record of an image pull's progress stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullProgress {
    /// Human-readable status line.
    pub status: Option<String>,
    /// Progress bar text.
    pub progress: Option<String>,
    /// Set when the pull failed.
    pub error: Option<String>,
}

impl PullProgress {
    /// Record carrying only a status line.
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Default::default()
        }
    }

    /// Record carrying an error.
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Stream of pull progress records.
pub type PullStream = BoxStream<'static, Result<PullProgress>>;

/// Host port published to a container port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    /// Port on the host.
    pub host_port: u16,
    /// Container port with protocol, e.g. `80/tcp`.
    pub container_port: String,
}

/// Parameters for creating a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Published ports.
    pub ports: Vec<PortBinding>,
    /// Bind mounts as `host:container`.
    pub binds: Vec<String>,
    /// `KEY=value` environment entries.
    pub env: Vec<String>,
}

/// Container state as reported by inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    /// Created, never started.
    Created,
    /// Running.
    Running,
    /// Paused.
    Paused,
    /// Restarting.
    Restarting,
    /// Being removed.
    Removing,
    /// Exited.
    Exited,
    /// Dead.
    Dead,
    /// Anything else the runtime reported.
    Unknown(String),
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerState::Created => f.write_str("created"),
            ContainerState::Running => f.write_str("running"),
            ContainerState::Paused => f.write_str("paused"),
            ContainerState::Restarting => f.write_str("restarting"),
            ContainerState::Removing => f.write_str("removing"),
            ContainerState::Exited => f.write_str("exited"),
            ContainerState::Dead => f.write_str("dead"),
            ContainerState::Unknown(other) => f.write_str(other),
        }
    }
}

/// Bidirectional stream attached to a container.
pub struct Attachment {
    /// Combined stdout/stderr.
    pub output: Pin<Box<dyn AsyncRead + Send>>,
    /// Container stdin.
    pub input: Pin<Box<dyn AsyncWrite + Send>>,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Attachment")
    }
}

/// Trait for container runtimes.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Get the runtime type identifier.
    fn runtime_type(&self) -> &'static str;

    /// List all containers, including stopped ones.
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;

    /// List local images.
    async fn list_images(&self) -> Result<Vec<ImageSummary>>;

    /// Pull an image, streaming its progress.
    async fn pull_image(&self, image: &str) -> Result<PullStream>;

    /// Create a container and return its ID.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Start a container.
    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Stop a container gracefully.
    async fn stop_container(&self, container_id: &str) -> Result<()>;

    /// Send a signal to a container.
    async fn kill_container(&self, container_id: &str, signal: &str) -> Result<()>;

    /// Read a container's current state.
    async fn inspect_container(&self, container_id: &str) -> Result<ContainerState>;

    /// Attach to a container's standard streams.
    async fn attach_container(&self, container_id: &str) -> Result<Attachment>;
}
