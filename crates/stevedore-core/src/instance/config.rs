// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance configuration.
//!
//! Two shapes describe the same configuration:
//!
//! - [`InstanceConfig`] is the stored form. It carries the instance ID and keys
//!   ports and volumes by host side, which keeps bindings unique.
//! - [`ConfigSpec`] is the wire form accepted from clients. Ports, volumes and
//!   environment entries are plain strings (`"8080:80/tcp"`, `"/srv:/data"`,
//!   `"KEY=value"`) and are validated when converted with
//!   [`ConfigSpec::into_config`].
//!
//! Both are tagged with a `type` field naming the backend.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::runtime::{ContainerSpec, PortBinding};

/// Discriminant stored alongside Docker configurations.
pub const DOCKER_KIND: &str = "Docker";

// "hostPort:containerPort/protocol", e.g. "8080:80/tcp"
static PORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+):(\d+/(?:udp|tcp))$").expect("port pattern is valid")
});

// "hostPath:containerPath", e.g. "/srv/world:/data"
static VOLUME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:]+):([^:]+)$").expect("volume pattern is valid"));

// "KEY=value", e.g. "EULA=TRUE"
static ENV_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+=.+$").expect("env pattern is valid"));

/// Configuration errors, raised at the boundary before an instance exists.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The `type` discriminant names no known backend.
    #[error("unknown instance type: {0}")]
    UnknownType(String),

    /// The payload could not be decoded.
    #[error("malformed config: {0}")]
    Malformed(String),

    /// No image reference was given.
    #[error("image must not be empty")]
    MissingImage,

    /// A port mapping did not match `hostPort:containerPort/proto`.
    #[error("invalid port config: {0}")]
    InvalidPort(String),

    /// Two port mappings used the same host port.
    #[error("duplicate host port: {0}")]
    DuplicatePort(u16),

    /// A volume mapping did not match `hostPath:containerPath`.
    #[error("invalid volume config: {0}")]
    InvalidVolume(String),

    /// Two volume mappings used the same host path.
    #[error("duplicate host path: {0}")]
    DuplicateVolume(String),

    /// An environment entry did not match `KEY=value`.
    #[error("invalid environment config: {0}")]
    InvalidEnv(String),
}

/// Stored configuration of a server instance, tagged by backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InstanceConfig {
    /// Container managed through a Docker-compatible runtime.
    Docker(DockerConfig),
}

/// Docker backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Instance ID; also the container name.
    pub id: Uuid,
    /// Image reference, e.g. `itzg/minecraft-server:latest`.
    pub image: String,
    /// Host path -> container path.
    #[serde(default)]
    pub volumes: BTreeMap<String, String>,
    /// Host port -> container port with protocol (`"80/tcp"`).
    #[serde(default)]
    pub ports: BTreeMap<u16, String>,
    /// `KEY=value` entries.
    #[serde(default)]
    pub env: Vec<String>,
}

impl InstanceConfig {
    /// Instance ID.
    pub fn id(&self) -> Uuid {
        match self {
            InstanceConfig::Docker(docker) => docker.id,
        }
    }

    /// Backend discriminant, as stored next to the configuration blob.
    pub fn kind(&self) -> &'static str {
        match self {
            InstanceConfig::Docker(_) => DOCKER_KIND,
        }
    }

    /// Host ports claimed by this instance, ascending.
    pub fn ports(&self) -> Vec<u16> {
        match self {
            InstanceConfig::Docker(docker) => docker.ports.keys().copied().collect(),
        }
    }

    /// Serialize the backend fields without the discriminant.
    pub fn to_blob(&self) -> Result<String, ConfigError> {
        let blob = match self {
            InstanceConfig::Docker(docker) => serde_json::to_string(docker),
        };
        blob.map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Rebuild a configuration from its discriminant and blob.
    pub fn from_blob(kind: &str, blob: &str) -> Result<Self, ConfigError> {
        match kind {
            DOCKER_KIND => serde_json::from_str::<DockerConfig>(blob)
                .map(InstanceConfig::Docker)
                .map_err(|e| ConfigError::Malformed(e.to_string())),
            other => Err(ConfigError::UnknownType(other.to_string())),
        }
    }
}

impl DockerConfig {
    /// Container creation parameters for this configuration.
    ///
    /// The container is named after the instance ID so a later lookup finds
    /// it again.
    pub fn container_spec(&self) -> ContainerSpec {
        ContainerSpec {
            name: self.id.to_string(),
            image: self.image.clone(),
            ports: self
                .ports
                .iter()
                .map(|(host_port, container_port)| PortBinding {
                    host_port: *host_port,
                    container_port: container_port.clone(),
                })
                .collect(),
            binds: self
                .volumes
                .iter()
                .map(|(host, container)| format!("{}:{}", host, container))
                .collect(),
            env: self.env.clone(),
        }
    }
}

/// Client-facing configuration, tagged by backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConfigSpec {
    /// Docker backend.
    Docker(DockerConfigSpec),
}

/// Client-facing Docker configuration using string encodings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfigSpec {
    /// Image reference.
    pub image: String,
    /// `"hostPort:containerPort/proto"` entries.
    #[serde(default)]
    pub ports: Vec<String>,
    /// `"hostPath:containerPath"` entries.
    #[serde(default)]
    pub volumes: Vec<String>,
    /// `"KEY=value"` entries.
    #[serde(default, alias = "environment")]
    pub env: Vec<String>,
}

impl ConfigSpec {
    /// Decode a JSON payload, reporting unknown discriminants by name.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| ConfigError::Malformed("missing field `type`".to_string()))?;

        if kind != DOCKER_KIND {
            return Err(ConfigError::UnknownType(kind.to_string()));
        }

        serde_json::from_value(value).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Validate the string encodings and build the stored configuration.
    pub fn into_config(self, id: Uuid) -> Result<InstanceConfig, ConfigError> {
        match self {
            ConfigSpec::Docker(spec) => spec.into_config(id).map(InstanceConfig::Docker),
        }
    }

    /// Render a stored configuration in the wire form.
    pub fn from_config(config: &InstanceConfig) -> Self {
        match config {
            InstanceConfig::Docker(docker) => ConfigSpec::Docker(DockerConfigSpec {
                image: docker.image.clone(),
                ports: docker
                    .ports
                    .iter()
                    .map(|(host, container)| format!("{}:{}", host, container))
                    .collect(),
                volumes: docker
                    .volumes
                    .iter()
                    .map(|(host, container)| format!("{}:{}", host, container))
                    .collect(),
                env: docker.env.clone(),
            }),
        }
    }
}

impl DockerConfigSpec {
    fn into_config(self, id: Uuid) -> Result<DockerConfig, ConfigError> {
        if self.image.trim().is_empty() {
            return Err(ConfigError::MissingImage);
        }

        let mut ports = BTreeMap::new();
        for port in &self.ports {
            let (host_port, container_port) = parse_port(port)?;
            if ports.insert(host_port, container_port).is_some() {
                return Err(ConfigError::DuplicatePort(host_port));
            }
        }

        let mut volumes = BTreeMap::new();
        for volume in &self.volumes {
            let caps = VOLUME_PATTERN
                .captures(volume)
                .ok_or_else(|| ConfigError::InvalidVolume(volume.clone()))?;
            let host = caps[1].to_string();
            if volumes.insert(host.clone(), caps[2].to_string()).is_some() {
                return Err(ConfigError::DuplicateVolume(host));
            }
        }

        for entry in &self.env {
            if !ENV_PATTERN.is_match(entry) {
                return Err(ConfigError::InvalidEnv(entry.clone()));
            }
        }

        Ok(DockerConfig {
            id,
            image: self.image,
            volumes,
            ports,
            env: self.env,
        })
    }
}

fn parse_port(port: &str) -> Result<(u16, String), ConfigError> {
    let caps = PORT_PATTERN
        .captures(port)
        .ok_or_else(|| ConfigError::InvalidPort(port.to_string()))?;

    let host_port: u16 = caps[1]
        .parse()
        .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;

    // The container side must also be a valid port number.
    let container = &caps[2];
    let container_number = container.split('/').next().unwrap_or_default();
    container_number
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;

    Ok((host_port, container.to_string()))
}
