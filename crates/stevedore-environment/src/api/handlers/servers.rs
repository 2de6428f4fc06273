// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Server instance handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use stevedore_core::Action;
use stevedore_core::instance::ConfigSpec;
use tracing::info;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, Result};
use crate::api::types::{
    ActionRequest, ConfigRequest, ServerListResponse, ServerResponse, SuccessResponse,
    TerminalRequest,
};

/// GET /api/servers - List all servers.
pub async fn list_servers(State(manager): State<AppState>) -> Json<ServerListResponse> {
    let instances = manager.list_instances().await;
    let mut servers = Vec::with_capacity(instances.len());
    for instance in &instances {
        servers.push(ServerResponse::from_instance(instance).await);
    }
    let total = servers.len();

    Json(ServerListResponse { servers, total })
}

/// POST /api/servers - Create a server from a configuration.
pub async fn create_server(
    State(manager): State<AppState>,
    Json(req): Json<ConfigRequest>,
) -> Result<(StatusCode, Json<ServerResponse>)> {
    let spec = ConfigSpec::from_json(req.config)?;
    let instance = manager.create_instance(spec).await?;

    Ok((
        StatusCode::CREATED,
        Json(ServerResponse::from_instance(&instance).await),
    ))
}

/// GET /api/servers/{id} - Get a server.
pub async fn get_server(
    State(manager): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ServerResponse>> {
    let instance = manager.get_instance(id).await?;
    Ok(Json(ServerResponse::from_instance(&instance).await))
}

/// PUT /api/servers/{id}/config - Store a new configuration.
///
/// The running instance keeps its current configuration; the response
/// carries the stored one.
pub async fn update_config(
    State(manager): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ConfigRequest>,
) -> Result<Json<ServerResponse>> {
    let spec = ConfigSpec::from_json(req.config)?;
    let config = manager.update_config(id, spec).await?;
    let instance = manager.get_instance(id).await?;

    Ok(Json(ServerResponse::with_config(&instance, &config).await))
}

/// POST /api/servers/{id}/actions - Submit a lifecycle action.
///
/// Responds once the action has been processed and the status reconciled.
/// Invalid transitions are not errors here; they are reported on the
/// server's terminal stream.
pub async fn submit_action(
    State(manager): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ActionRequest>,
) -> Result<Json<ServerResponse>> {
    let action: Action = req.action.parse().map_err(ApiError::BadRequest)?;
    let instance = manager.get_instance(id).await?;

    info!(instance_id = %id, action = %action, "Submitting action");
    instance.submit(action).await?;

    Ok(Json(ServerResponse::from_instance(&instance).await))
}

/// POST /api/servers/{id}/terminal - Write a line to the server's stdin.
///
/// Answers 409 when no container is attached to receive the line.
pub async fn send_terminal(
    State(manager): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TerminalRequest>,
) -> Result<(StatusCode, Json<SuccessResponse>)> {
    let instance = manager.get_instance(id).await?;
    instance.send_input(req.line).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SuccessResponse {
            message: "line sent".to_string(),
        }),
    ))
}
