// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for stevedore-environment.
//!
//! [`EnvironmentRuntime`] wires a [`ServerManager`] to the HTTP API so the
//! environment can run inside an existing tokio application instead of as the
//! standalone binary.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stevedore_environment::docker::DockerRuntime;
//! use stevedore_environment::runtime::{EnvironmentRuntime, connect_persistence};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let persistence = connect_persistence("sqlite:.data/stevedore.db?mode=rwc").await?;
//!     let docker = Arc::new(DockerRuntime::connect()?);
//!
//!     let runtime = EnvironmentRuntime::builder()
//!         .persistence(persistence)
//!         .container_runtime(docker)
//!         .bind_addr("127.0.0.1:8080".parse()?)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... run your application ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use stevedore_core::instance::lifecycle::DEFAULT_RECONCILE_INTERVAL;
use stevedore_core::{
    ContainerRuntime, InstanceOptions, Persistence, PostgresPersistence, ServerManager,
    SqlitePersistence,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::api;
use crate::error::Error;

/// Open the persistence backend named by `url`'s scheme and run its
/// migrations.
///
/// `postgres://` and `postgresql://` select PostgreSQL, `sqlite:` selects
/// SQLite.
pub async fn connect_persistence(url: &str) -> crate::error::Result<Arc<dyn Persistence>> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let persistence = PostgresPersistence::connect(url).await?;
        info!("Connected to PostgreSQL");
        Ok(Arc::new(persistence))
    } else if url.starts_with("sqlite:") {
        let persistence = SqlitePersistence::connect(url).await?;
        info!("Connected to SQLite");
        Ok(Arc::new(persistence))
    } else {
        Err(Error::UnsupportedDatabase(url.to_string()))
    }
}

/// Builder for creating an [`EnvironmentRuntime`].
pub struct EnvironmentRuntimeBuilder {
    persistence: Option<Arc<dyn Persistence>>,
    container_runtime: Option<Arc<dyn ContainerRuntime>>,
    bind_addr: SocketAddr,
    reconcile_interval: Option<Duration>,
}

impl Default for EnvironmentRuntimeBuilder {
    fn default() -> Self {
        Self {
            persistence: None,
            container_runtime: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            reconcile_interval: Some(DEFAULT_RECONCILE_INTERVAL),
        }
    }
}

impl EnvironmentRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration store (required).
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set the container runtime (required).
    pub fn container_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.container_runtime = Some(runtime);
        self
    }

    /// Set the bind address for the HTTP API.
    ///
    /// Default: `0.0.0.0:8080`. Port 0 picks a free port; see
    /// [`EnvironmentRuntime::local_addr`].
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set how often idle instances reconcile with their container.
    ///
    /// Default: 30 seconds. `None` disables periodic reconciliation.
    pub fn reconcile_interval(mut self, interval: Option<Duration>) -> Self {
        self.reconcile_interval = interval;
        self
    }

    /// Build the runtime configuration.
    pub fn build(self) -> Result<EnvironmentRuntimeConfig> {
        let persistence = self
            .persistence
            .ok_or_else(|| anyhow::anyhow!("persistence is required"))?;
        let container_runtime = self
            .container_runtime
            .ok_or_else(|| anyhow::anyhow!("container_runtime is required"))?;

        Ok(EnvironmentRuntimeConfig {
            persistence,
            container_runtime,
            bind_addr: self.bind_addr,
            options: InstanceOptions {
                reconcile_interval: self.reconcile_interval,
            },
        })
    }
}

/// Configuration for an [`EnvironmentRuntime`].
pub struct EnvironmentRuntimeConfig {
    persistence: Arc<dyn Persistence>,
    container_runtime: Arc<dyn ContainerRuntime>,
    bind_addr: SocketAddr,
    options: InstanceOptions,
}

impl EnvironmentRuntimeConfig {
    /// Load stored servers, bind the listener and spawn the HTTP server.
    pub async fn start(self) -> Result<EnvironmentRuntime> {
        let manager = Arc::new(
            ServerManager::load(
                self.persistence,
                self.container_runtime.clone(),
                self.options,
            )
            .await?,
        );

        let listener = TcpListener::bind(self.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let (server_shutdown_tx, server_shutdown_rx) = watch::channel(false);
        let router = api::create_router(manager.clone());
        let server_handle = tokio::spawn(run_http_server(listener, router, server_shutdown_rx));

        info!(
            bind_addr = %local_addr,
            runtime_type = self.container_runtime.runtime_type(),
            "EnvironmentRuntime started"
        );

        Ok(EnvironmentRuntime {
            server_handle,
            server_shutdown_tx,
            manager,
            local_addr,
        })
    }
}

/// A running stevedore environment that can be embedded in an application.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct EnvironmentRuntime {
    server_handle: JoinHandle<std::io::Result<()>>,
    server_shutdown_tx: watch::Sender<bool>,
    manager: Arc<ServerManager>,
    local_addr: SocketAddr,
}

impl EnvironmentRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> EnvironmentRuntimeBuilder {
        EnvironmentRuntimeBuilder::new()
    }

    /// Address the HTTP API is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The server manager behind the API.
    pub fn manager(&self) -> &Arc<ServerManager> {
        &self.manager
    }

    /// Check if the HTTP server is still running.
    pub fn is_running(&self) -> bool {
        !self.server_handle.is_finished()
    }

    /// Gracefully shut down the runtime.
    ///
    /// Stops accepting requests, closes every server instance, then waits for
    /// open connections to drain. Event streams end when their instance
    /// closes.
    pub async fn shutdown(self) -> Result<()> {
        info!("EnvironmentRuntime shutting down...");

        let _ = self.server_shutdown_tx.send(true);

        self.manager.close().await;

        match self.server_handle.await {
            Ok(Ok(())) => {
                info!("EnvironmentRuntime shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("EnvironmentRuntime server error during shutdown: {}", e);
                Err(e.into())
            }
            Err(e) => {
                error!("EnvironmentRuntime server task panicked: {}", e);
                Err(anyhow::anyhow!("server task panicked: {}", e))
            }
        }
    }
}

/// Serve the API until the shutdown flag is raised.
async fn run_http_server(
    listener: TcpListener,
    router: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), "HTTP server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
            info!("HTTP server received shutdown signal");
        })
        .await
}
