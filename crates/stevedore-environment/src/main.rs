// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stevedore Environment - Game Server Lifecycle Management Server
//!
//! An HTTP server responsible for:
//! - Server configuration storage (PostgreSQL or SQLite)
//! - Server lifecycle (start, stop, kill, status)
//! - Terminal relay (container output and input)
//! - Container execution (Docker)

use std::sync::Arc;
use tracing::{info, warn};

use stevedore_core::ContainerRuntime;
use stevedore_environment::config::Config;
use stevedore_environment::docker::DockerRuntime;
use stevedore_environment::runtime::{EnvironmentRuntime, connect_persistence};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stevedore_environment=info,stevedore_core=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        http_addr = %config.http_addr,
        reconcile_interval = ?config.reconcile_interval,
        "Starting Stevedore Environment"
    );

    let persistence = connect_persistence(&config.database_url).await?;

    let docker = Arc::new(DockerRuntime::connect()?);
    if let Err(e) = docker.ping().await {
        warn!(error = %e, "Docker daemon did not answer; container calls will fail until it does");
    }
    info!(runtime_type = docker.runtime_type(), "Container runtime initialized");

    let runtime = EnvironmentRuntime::builder()
        .persistence(persistence)
        .container_runtime(docker)
        .bind_addr(config.http_addr)
        .reconcile_interval(config.reconcile_interval)
        .build()?
        .start()
        .await?;

    info!(addr = %runtime.local_addr(), "Environment server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Stevedore Environment shut down");

    Ok(())
}
