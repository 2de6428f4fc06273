// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP API over the server manager.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/api/health` | [`handlers::health`] |
//! | GET | `/api/servers` | [`handlers::list_servers`] |
//! | POST | `/api/servers` | [`handlers::create_server`] |
//! | GET | `/api/servers/{id}` | [`handlers::get_server`] |
//! | PUT | `/api/servers/{id}/config` | [`handlers::update_config`] |
//! | POST | `/api/servers/{id}/actions` | [`handlers::submit_action`] |
//! | POST | `/api/servers/{id}/terminal` | [`handlers::send_terminal`] |
//! | GET | `/api/servers/{id}/events` | [`handlers::server_events`] (SSE) |

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use stevedore_core::ServerManager;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error;
pub mod handlers;
pub mod types;

pub use error::{ApiError, Result};

/// State shared by every handler.
pub type AppState = Arc<ServerManager>;

/// Build the API router.
pub fn create_router(manager: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handlers::health))
        .route(
            "/api/servers",
            get(handlers::list_servers).post(handlers::create_server),
        )
        .route("/api/servers/{id}", get(handlers::get_server))
        .route("/api/servers/{id}/config", put(handlers::update_config))
        .route("/api/servers/{id}/actions", post(handlers::submit_action))
        .route("/api/servers/{id}/terminal", post(handlers::send_terminal))
        .route("/api/servers/{id}/events", get(handlers::server_events))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(manager)
}
