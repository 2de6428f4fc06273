// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed persistence implementation.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use crate::error::CoreError;
use crate::instance::config::InstanceConfig;
use crate::migrations::SQLITE as MIGRATOR;

use super::{ConfigRecord, Persistence, map_insert_error};

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a `sqlite:` URL and run migrations.
    ///
    /// In-memory databases are limited to a single connection, since each
    /// connection would otherwise see its own empty database.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        MIGRATOR.run(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Open (creating if needed) the database file at `path` and run
    /// migrations. Parent directories are created as well.
    ///
    /// ```ignore
    /// let persistence = SqlitePersistence::from_path(".data/stevedore.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoreError::Other(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }

        Self::connect(&format!("sqlite:{}?mode=rwc", path.to_string_lossy())).await
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Persistence for SqlitePersistence {
    async fn create_config(&self, config: &InstanceConfig) -> Result<(), CoreError> {
        let id = config.id();
        sqlx::query(
            r#"
            INSERT INTO server_configs (id, kind, config)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(config.kind())
        .bind(config.to_blob()?)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(id, e))?;

        Ok(())
    }

    async fn list_configs(&self) -> Result<Vec<ConfigRecord>, CoreError> {
        let records = sqlx::query_as::<_, ConfigRecord>(
            r#"
            SELECT id, kind, config, created_at, updated_at
            FROM server_configs
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn update_config(&self, config: &InstanceConfig) -> Result<(), CoreError> {
        let id = config.id();
        let result = sqlx::query(
            r#"
            UPDATE server_configs
            SET kind = ?2, config = ?3, updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(config.kind())
        .bind(config.to_blob()?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::InstanceNotFound(id));
        }

        Ok(())
    }

    async fn get_config(&self, id: Uuid) -> Result<Option<ConfigRecord>, CoreError> {
        let record = sqlx::query_as::<_, ConfigRecord>(
            r#"
            SELECT id, kind, config, created_at, updated_at
            FROM server_configs
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
