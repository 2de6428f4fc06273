// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use stevedore_core::CoreError;
use stevedore_core::instance::ConfigError;
use thiserror::Error;

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors returned to HTTP clients as `{"error": "..."}`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The container runtime failed while resolving a container.
    #[error("bad gateway: {0}")]
    BadGateway(String),

    /// The server instance is shutting down.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string()
        }));
        (status, body).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config(e) => e.into(),
            CoreError::InstanceNotFound(id) => ApiError::NotFound(format!("server {}", id)),
            CoreError::InstanceExists(id) => {
                ApiError::Conflict(format!("server {} already exists", id))
            }
            CoreError::Resolve(e) => {
                ApiError::BadGateway(format!("Unable to get container: {}", e))
            }
            CoreError::NotAttached(id) => {
                ApiError::Conflict(format!("server {} is not attached to a container", id))
            }
            CoreError::InstanceClosed(id) => {
                ApiError::ServiceUnavailable(format!("server {} is shutting down", id))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
