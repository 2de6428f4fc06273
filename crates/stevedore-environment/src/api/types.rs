// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request and response bodies.

use serde::{Deserialize, Serialize};
use stevedore_core::instance::ConfigSpec;
use stevedore_core::{InstanceConfig, ServerInstance, Status};
use uuid::Uuid;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// A server instance as seen by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerResponse {
    /// Instance ID.
    pub id: Uuid,
    /// Current lifecycle status.
    pub status: Status,
    /// Configuration in its string-encoded form.
    pub config: ConfigSpec,
}

impl ServerResponse {
    /// Snapshot a live instance.
    pub async fn from_instance(instance: &ServerInstance) -> Self {
        Self::with_config(instance, instance.config()).await
    }

    /// Snapshot a live instance's status alongside `config`.
    pub async fn with_config(instance: &ServerInstance, config: &InstanceConfig) -> Self {
        Self {
            id: instance.id(),
            status: instance.status().await,
            config: ConfigSpec::from_config(config),
        }
    }
}

/// Server list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerListResponse {
    /// Servers ordered by ID.
    pub servers: Vec<ServerResponse>,
    /// Total count.
    pub total: usize,
}

/// Body of `POST /api/servers` and `PUT /api/servers/{id}/config`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigRequest {
    /// Tagged configuration, e.g. `{"type": "Docker", "image": "nginx"}`.
    pub config: serde_json::Value,
}

/// Body of `POST /api/servers/{id}/actions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    /// `Start`, `Stop` or `Kill`.
    pub action: String,
}

/// Body of `POST /api/servers/{id}/terminal`.
#[derive(Debug, Clone, Deserialize)]
pub struct TerminalRequest {
    /// Line written to the container's standard input.
    pub line: String,
}

/// Generic acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    /// Human-readable message.
    pub message: String,
}
