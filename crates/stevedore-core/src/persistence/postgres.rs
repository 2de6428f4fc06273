// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed persistence implementation.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::error::CoreError;
use crate::instance::config::InstanceConfig;
use crate::migrations::POSTGRES as MIGRATOR;

use super::{ConfigRecord, Persistence, map_insert_error};

/// PostgreSQL-backed persistence implementation.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence from an existing, migrated pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Persistence for PostgresPersistence {
    async fn create_config(&self, config: &InstanceConfig) -> Result<(), CoreError> {
        let id = config.id();
        sqlx::query(
            r#"
            INSERT INTO server_configs (id, kind, config, created_at, updated_at)
            VALUES ($1, $2, $3::jsonb, NOW(), NOW())
            "#,
        )
        .bind(id)
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
            SELECT id::text AS id, kind, config::text AS config, created_at, updated_at
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
            SET kind = $2, config = $3::jsonb, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(config.kind())
        .bind(config.to_blob()?)
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
            SELECT id::text AS id, kind, config::text AS config, created_at, updated_at
            FROM server_configs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
