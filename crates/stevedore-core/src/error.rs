// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for stevedore-core.

use thiserror::Error;
use uuid::Uuid;

use crate::instance::config::ConfigError;
use crate::instance::resolver::ResolveError;
use crate::runtime::RuntimeError;

/// Result type using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors.
///
/// Of the lifecycle API, only configuration and resolution failures and
/// undeliverable terminal input reach callers. Invalid actions and runtime
/// call failures are reported on the instance's terminal stream instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Instance configuration was rejected.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The instance's container could not be resolved.
    #[error("Unable to get container: {0}")]
    Resolve(#[from] ResolveError),

    /// Container runtime call failed.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Instance was not found.
    #[error("Instance not found: {0}")]
    InstanceNotFound(Uuid),

    /// An instance with the same ID already exists.
    #[error("Instance already exists: {0}")]
    InstanceExists(Uuid),

    /// The instance's lifecycle loop has exited.
    #[error("Instance closed: {0}")]
    InstanceClosed(Uuid),

    /// No attachment was listening for terminal input.
    #[error("Instance not attached to a container: {0}")]
    NotAttached(Uuid),

    /// Other error.
    #[error("{0}")]
    Other(String),
}
