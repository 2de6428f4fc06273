// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container resolution.
//!
//! Turns a [`DockerConfig`] into a runtime container ID:
//!
//! 1. Find an existing container named after the instance ID. Its image must
//!    match the configured one exactly.
//! 2. Otherwise check whether the image is available locally.
//! 3. Pull it if not, republishing each status line on TerminalOut.
//! 4. Create the container, named after the instance ID.
//!
//! Because of the deterministic name, resolving the same configuration twice
//! yields the same container.

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tracing::{error, info};

use crate::events::Broadcaster;
use crate::instance::config::DockerConfig;
use crate::runtime::{ContainerRuntime, RuntimeError};

/// Errors raised while resolving a container.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// Listing containers failed.
    #[error("Unable to list containers: {0}")]
    ListContainers(#[source] RuntimeError),

    /// A container with the instance's name runs a different image.
    #[error("Found non-matching container image: {found} (expected {expected})")]
    ImageMismatch {
        /// Image of the existing container.
        found: String,
        /// Configured image.
        expected: String,
    },

    /// Listing images failed.
    #[error("Unable to list images: {0}")]
    ListImages(#[source] RuntimeError),

    /// The pull could not be started or its stream broke.
    #[error("Failed to pull image \"{image}\": {source}")]
    Pull {
        /// Image being pulled.
        image: String,
        /// Underlying runtime error.
        #[source]
        source: RuntimeError,
    },

    /// The runtime reported an error record during the pull.
    #[error("Pull errored: {0}")]
    PullFailed(String),

    /// Creating the container failed.
    #[error("Unable to create container: {0}")]
    Create(#[source] RuntimeError),
}

/// Resolves instance configurations to runtime containers.
#[derive(Clone)]
pub struct Resolver {
    runtime: Arc<dyn ContainerRuntime>,
    terminal_out: Broadcaster<String>,
}

impl Resolver {
    /// Create a resolver publishing pull progress on `terminal_out`.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, terminal_out: Broadcaster<String>) -> Self {
        Self {
            runtime,
            terminal_out,
        }
    }

    /// Look up the instance's container without pulling or creating anything.
    pub async fn find_existing(&self, config: &DockerConfig) -> Result<Option<String>, ResolveError> {
        let name = config.id.to_string();
        let containers = self
            .runtime
            .list_containers()
            .await
            .map_err(ResolveError::ListContainers)?;

        let Some(container) = containers.into_iter().find(|c| c.has_name(&name)) else {
            return Ok(None);
        };

        if container.image != config.image {
            error!(
                instance_id = %config.id,
                found = %container.image,
                expected = %config.image,
                "Found non-matching container image"
            );
            return Err(ResolveError::ImageMismatch {
                found: container.image,
                expected: config.image.clone(),
            });
        }

        info!(instance_id = %config.id, container_id = %container.id, "Found container");
        Ok(Some(container.id))
    }

    /// Resolve the instance's container, pulling and creating as needed.
    pub async fn resolve(&self, config: &DockerConfig) -> Result<String, ResolveError> {
        if let Some(container_id) = self.find_existing(config).await? {
            return Ok(container_id);
        }

        if self.image_present(&config.image).await? {
            info!(instance_id = %config.id, image = %config.image, "Found image");
        } else {
            self.pull(config).await?;
        }

        let container_id = self
            .runtime
            .create_container(&config.container_spec())
            .await
            .map_err(|e| {
                error!(instance_id = %config.id, error = %e, "Unable to create container");
                ResolveError::Create(e)
            })?;

        info!(instance_id = %config.id, container_id = %container_id, "Created container");
        Ok(container_id)
    }

    async fn image_present(&self, image: &str) -> Result<bool, ResolveError> {
        let images = self
            .runtime
            .list_images()
            .await
            .map_err(ResolveError::ListImages)?;
        Ok(images.iter().any(|i| i.matches(image)))
    }

    async fn pull(&self, config: &DockerConfig) -> Result<(), ResolveError> {
        let image = &config.image;
        info!(instance_id = %config.id, image = %image, "Pulling image");
        self.terminal_out
            .dispatch(format!("Pulling image \"{}\"", image))
            .await;

        let pull_error = |source| ResolveError::Pull {
            image: image.clone(),
            source,
        };

        let mut progress = self.runtime.pull_image(image).await.map_err(pull_error)?;

        while let Some(record) = progress.next().await {
            let record = record.map_err(pull_error)?;

            if let Some(message) = record.error.filter(|e| !e.is_empty()) {
                error!(instance_id = %config.id, image = %image, error = %message, "Pull errored");
                return Err(ResolveError::PullFailed(message));
            }

            if let Some(status) = record.status.filter(|s| !s.is_empty()) {
                info!(instance_id = %config.id, "[Docker] {}", status);
                self.terminal_out
                    .dispatch(format!("[Docker] {}", status))
                    .await;
            }
        }

        info!(instance_id = %config.id, image = %image, "Pulled image");
        Ok(())
    }
}
