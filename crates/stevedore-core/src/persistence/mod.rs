// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for stevedore-core.
//!
//! Configurations are stored as an opaque JSON blob next to their backend
//! discriminant, keyed by instance ID. Status and container IDs are never
//! stored; they are rediscovered from the runtime.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CoreError;
use crate::instance::config::{ConfigError, InstanceConfig};

/// Stored configuration row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConfigRecord {
    /// Instance ID.
    pub id: String,
    /// Backend discriminant, e.g. `Docker`.
    pub kind: String,
    /// Backend fields as JSON, without the discriminant.
    pub config: String,
    /// When the configuration was first stored.
    pub created_at: DateTime<Utc>,
    /// When the configuration was last replaced.
    pub updated_at: DateTime<Utc>,
}

impl ConfigRecord {
    /// Decode the stored configuration.
    pub fn to_config(&self) -> Result<InstanceConfig, ConfigError> {
        InstanceConfig::from_blob(&self.kind, &self.config)
    }
}

/// Configuration storage.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Store a new configuration. Fails with
    /// [`CoreError::InstanceExists`] if the ID is taken.
    async fn create_config(&self, config: &InstanceConfig) -> Result<(), CoreError>;

    /// All stored configurations, oldest first.
    async fn list_configs(&self) -> Result<Vec<ConfigRecord>, CoreError>;

    /// Replace a stored configuration. Fails with
    /// [`CoreError::InstanceNotFound`] if the ID is unknown.
    async fn update_config(&self, config: &InstanceConfig) -> Result<(), CoreError>;

    /// Fetch one configuration.
    async fn get_config(&self, id: Uuid) -> Result<Option<ConfigRecord>, CoreError>;
}

/// Map a unique-key violation on insert to [`CoreError::InstanceExists`].
pub(crate) fn map_insert_error(id: Uuid, err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => CoreError::InstanceExists(id),
        _ => CoreError::Database(err),
    }
}
