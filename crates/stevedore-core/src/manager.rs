// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Registry of live server instances.
//!
//! The manager stores configurations through [`Persistence`] and keeps one
//! [`ServerInstance`] per stored configuration. On startup it rehydrates
//! every stored configuration; each instance then adopts its container, if
//! one exists, on its own.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::instance::config::{ConfigSpec, InstanceConfig};
use crate::instance::lifecycle::{InstanceOptions, ServerInstance};
use crate::persistence::Persistence;
use crate::runtime::ContainerRuntime;

/// Owns all live instances.
pub struct ServerManager {
    persistence: Arc<dyn Persistence>,
    runtime: Arc<dyn ContainerRuntime>,
    options: InstanceOptions,
    instances: RwLock<BTreeMap<Uuid, Arc<ServerInstance>>>,
}

impl ServerManager {
    /// Create an empty manager.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        runtime: Arc<dyn ContainerRuntime>,
        options: InstanceOptions,
    ) -> Self {
        Self {
            persistence,
            runtime,
            options,
            instances: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a manager and spawn an instance for every stored configuration.
    ///
    /// Records that no longer decode are logged and skipped.
    pub async fn load(
        persistence: Arc<dyn Persistence>,
        runtime: Arc<dyn ContainerRuntime>,
        options: InstanceOptions,
    ) -> Result<Self> {
        let manager = Self::new(persistence, runtime, options);
        let records = manager.persistence.list_configs().await?;

        let mut instances = manager.instances.write().await;
        for record in records {
            match record.to_config() {
                Ok(config) => {
                    let instance = manager.spawn(config);
                    instances.insert(instance.id(), instance);
                }
                Err(e) => {
                    error!(instance_id = %record.id, error = %e, "Skipping unreadable configuration");
                }
            }
        }
        info!(count = instances.len(), "Loaded server instances");
        drop(instances);

        Ok(manager)
    }

    fn spawn(&self, config: InstanceConfig) -> Arc<ServerInstance> {
        Arc::new(ServerInstance::spawn(
            config,
            self.runtime.clone(),
            self.options.clone(),
        ))
    }

    /// Validate `spec`, store it under a fresh ID and spawn its instance.
    pub async fn create_instance(&self, spec: ConfigSpec) -> Result<Arc<ServerInstance>> {
        let config = spec.into_config(Uuid::new_v4())?;
        self.register(config).await
    }

    /// Store an already-validated configuration and spawn its instance.
    pub async fn register(&self, config: InstanceConfig) -> Result<Arc<ServerInstance>> {
        let id = config.id();
        let mut instances = self.instances.write().await;
        if instances.contains_key(&id) {
            return Err(CoreError::InstanceExists(id));
        }

        self.persistence.create_config(&config).await?;

        let instance = self.spawn(config);
        instances.insert(id, instance.clone());
        info!(instance_id = %id, "Created server instance");

        Ok(instance)
    }

    /// Look up a live instance.
    pub async fn get_instance(&self, id: Uuid) -> Result<Arc<ServerInstance>> {
        self.instances
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(CoreError::InstanceNotFound(id))
    }

    /// All live instances, ordered by ID.
    pub async fn list_instances(&self) -> Vec<Arc<ServerInstance>> {
        self.instances.read().await.values().cloned().collect()
    }

    /// Replace the stored configuration of an existing instance.
    ///
    /// The live instance keeps the configuration it was spawned with; the new
    /// one takes effect when the instance is next loaded.
    pub async fn update_config(&self, id: Uuid, spec: ConfigSpec) -> Result<InstanceConfig> {
        if !self.instances.read().await.contains_key(&id) {
            return Err(CoreError::InstanceNotFound(id));
        }

        let config = spec.into_config(id)?;
        self.persistence.update_config(&config).await?;
        info!(instance_id = %id, "Updated server configuration");

        Ok(config)
    }

    /// Stored configuration of an instance, which may be newer than the one
    /// the live instance runs with.
    pub async fn stored_config(&self, id: Uuid) -> Result<InstanceConfig> {
        let record = self
            .persistence
            .get_config(id)
            .await?
            .ok_or(CoreError::InstanceNotFound(id))?;
        Ok(record.to_config()?)
    }

    /// Close every instance concurrently.
    pub async fn close(&self) {
        let instances = self.list_instances().await;
        join_all(instances.iter().map(|instance| instance.close())).await;
        info!(count = instances.len(), "Closed server instances");
    }
}
