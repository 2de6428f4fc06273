// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stevedore Core - Server Instance Lifecycle Engine
//!
//! This crate manages long-lived, container-backed server instances. Each
//! instance runs its own lifecycle loop that serializes Start/Stop/Kill
//! actions against one container, reconciles its status with the container
//! runtime, and streams the container's console as events.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      stevedore-environment                              │
//! │              (HTTP API, Docker runtime, process wiring)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ServerManager                                 │
//! │                 (instance registry, configuration storage)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │                                              │
//!           │ one per instance                             │ Persistence
//!           ▼                                              ▼
//! ┌───────────────────────────┐                ┌───────────────────────────┐
//! │      ServerInstance       │                │   PostgreSQL / SQLite     │
//! │  lifecycle loop, resolver │                │   (configuration blobs)   │
//! │  attachment, events       │                └───────────────────────────┘
//! └───────────────────────────┘
//!           │ ContainerRuntime
//!           ▼
//! ┌───────────────────────────┐
//! │   Docker (or MockRuntime) │
//! └───────────────────────────┘
//! ```
//!
//! # Event Streams
//!
//! | Stream | Payload | Published by |
//! |--------|---------|--------------|
//! | Status | [`Status`] | Lifecycle loop, only on change |
//! | TerminalOut | `String` | Container output, pull progress, diagnostics |
//! | TerminalIn | `String` | Callers; written to the container's stdin |
//!
//! Every stream is a [`Broadcaster`]: publishing waits until each current
//! subscriber has received the value.
//!
//! # Actions
//!
//! | Status | Action | Runtime call | Transient status |
//! |--------|--------|--------------|------------------|
//! | `Initializing` | `Start` | resolve, attach, start | `Starting` |
//! | `Idle` | `Start` | start | `Starting` |
//! | `Running` | `Stop` | stop | `Stopping` |
//! | `Running` | `Kill` | kill with `SIGKILL` | `Stopping` |
//!
//! Any other combination is reported on TerminalOut and leaves the status
//! unchanged. Every action ends with a reconciliation pass.
//!
//! # Example
//!
//! ```ignore
//! let manager = ServerManager::load(persistence, runtime, InstanceOptions::default()).await?;
//! let instance = manager.create_instance(spec).await?;
//!
//! let mut output = instance.subscribe_terminal_out().await;
//! tokio::spawn(async move {
//!     while let Some(line) = output.recv().await {
//!         println!("{line}");
//!     }
//! });
//!
//! instance.submit(Action::Start).await?;
//! instance.send_input("say hello").await?;
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod events;
pub mod instance;
pub mod manager;
pub mod migrations;
pub mod persistence;
pub mod runtime;

pub use error::{CoreError, Result};
pub use events::{Broadcaster, Subscription};
pub use instance::{Action, InstanceConfig, InstanceOptions, ServerInstance, Status};
pub use manager::ServerManager;
pub use persistence::{ConfigRecord, Persistence, PostgresPersistence, SqlitePersistence};
pub use runtime::{ContainerRuntime, MockRuntime};
