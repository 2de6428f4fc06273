// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stevedore Environment - Server Lifecycle Management
//!
//! This crate hosts the lifecycle engine from `stevedore-core` behind an HTTP
//! API and drives real containers through Docker.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         External Clients                                │
//! │                   (dashboards, CLI, curl, SSE)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │ HTTP (port 8080)
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  stevedore-environment (This Crate)                     │
//! │  ┌─────────────┐  ┌─────────────────────────────┐  ┌─────────────┐      │
//! │  │  HTTP API   │─▶│ ServerManager (core)        │─▶│   Docker    │      │
//! │  │  (axum)     │  │  one lifecycle per server   │  │   Runtime   │      │
//! │  └─────────────┘  └─────────────────────────────┘  └─────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │                        │
//!                                    ▼                        ▼
//!                     ┌───────────────────────────┐  ┌─────────────────────┐
//!                     │ PostgreSQL / SQLite       │  │   Docker daemon     │
//!                     │ (server configurations)   │  │   (bollard)         │
//!                     └───────────────────────────┘  └─────────────────────┘
//! ```
//!
//! # HTTP API
//!
//! See [`api`] for the route table. Actions respond once the action has been
//! applied and the status reconciled; status changes and terminal output are
//! streamed as Server-Sent Events.
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `STEVEDORE_DATABASE_URL` | Yes* | - | `postgres://...` or `sqlite:...` |
//! | `DATABASE_URL` | Yes* | - | Fallback for the above |
//! | `STEVEDORE_HTTP_PORT` | No | `8080` | HTTP API port |
//! | `STEVEDORE_RECONCILE_INTERVAL_SECS` | No | `30` | Idle reconciliation period; `0` disables |
//! | `DOCKER_HOST` | No | platform socket | Docker daemon address |
//! | `RUST_LOG` | No | `stevedore_environment=info,stevedore_core=info` | Log filter |

#![deny(missing_docs)]

pub mod api;
pub mod config;
pub mod docker;
pub mod error;
pub mod runtime;

pub use config::Config;
pub use docker::DockerRuntime;
pub use error::{Error, Result};
pub use runtime::{EnvironmentRuntime, connect_persistence};
