// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared helpers for stevedore-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use stevedore_core::instance::config::{ConfigSpec, DockerConfigSpec};
use stevedore_core::{InstanceConfig, InstanceOptions, ServerInstance, Status, Subscription};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Build a validated Docker configuration.
pub fn docker_config(image: &str, ports: &[&str]) -> InstanceConfig {
    ConfigSpec::Docker(DockerConfigSpec {
        image: image.to_string(),
        ports: ports.iter().map(|p| p.to_string()).collect(),
        volumes: vec![],
        env: vec![],
    })
    .into_config(Uuid::new_v4())
    .expect("test config should be valid")
}

/// Options with periodic reconciliation turned off.
pub fn no_periodic() -> InstanceOptions {
    InstanceOptions {
        reconcile_interval: None,
    }
}

/// Collect everything a subscription receives until its stream closes.
pub fn collect<T: Send + 'static>(mut sub: Subscription<T>) -> JoinHandle<Vec<T>> {
    tokio::spawn(async move {
        let mut values = Vec::new();
        while let Some(value) = sub.recv().await {
            values.push(value);
        }
        values
    })
}

/// Poll until the instance reports `status`.
pub async fn wait_for_status(instance: &ServerInstance, status: Status) {
    for _ in 0..200 {
        if instance.status().await == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "instance never reached {status}, still {}",
        instance.status().await
    );
}

/// Poll until the instance's attachment listens on TerminalIn.
pub async fn wait_for_attachment(instance: &ServerInstance) {
    for _ in 0..200 {
        if instance.events().terminal_in.subscriber_count().await > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("instance never attached to its container");
}

/// Spawn an instance behind an `Arc` so tests can share it across tasks.
pub fn spawn_shared(
    config: InstanceConfig,
    runtime: Arc<stevedore_core::MockRuntime>,
    options: InstanceOptions,
) -> Arc<ServerInstance> {
    Arc::new(ServerInstance::spawn(config, runtime, options))
}
