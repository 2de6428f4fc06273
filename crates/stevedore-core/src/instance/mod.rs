// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Server instances and their lifecycle.
//!
//! # Status Transitions
//!
//! | From | Trigger | To |
//! |------|---------|----|
//! | `Initializing` | `Start`, container resolved | `Starting`, then reconciled |
//! | `Initializing` | `Start`, resolution failed | `Errored` |
//! | `Idle` | `Start` | `Starting`, then reconciled |
//! | `Running` | `Stop` / `Kill` | `Stopping`, then reconciled |
//! | any resolved | reconciliation | `Idle` (created/exited), `Running`, or `Errored` |
//!
//! Transient states (`Starting`, `Stopping`) are always followed by a
//! reconciliation pass that reads the container's real state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::events::Broadcaster;

pub mod attach;
pub mod config;
pub mod lifecycle;
pub mod resolver;

pub use config::{ConfigError, ConfigSpec, DockerConfig, DockerConfigSpec, InstanceConfig};
pub use lifecycle::{InstanceOptions, ServerInstance};
pub use resolver::{ResolveError, Resolver};

/// Lifecycle status of a server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// No container has been resolved yet.
    Initializing,
    /// Container exists but is not running.
    Idle,
    /// A start was issued and has not been reconciled yet.
    Starting,
    /// Container is running.
    Running,
    /// A stop or kill was issued and has not been reconciled yet.
    Stopping,
    /// Resolution or reconciliation failed.
    Errored,
}

impl Status {
    /// Status name as published to clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Initializing => "Initializing",
            Status::Idle => "Idle",
            Status::Starting => "Starting",
            Status::Running => "Running",
            Status::Stopping => "Stopping",
            Status::Errored => "Errored",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle command submitted against an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Resolve the container if needed, then start it.
    Start,
    /// Stop the container gracefully.
    Stop,
    /// Stop the container with a forced signal.
    Kill,
}

impl Action {
    /// Action name as accepted from clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "Start",
            Action::Stop => "Stop",
            Action::Kill => "Kill",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Start" => Ok(Action::Start),
            "Stop" => Ok(Action::Stop),
            "Kill" => Ok(Action::Kill),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}

/// The three event streams owned by an instance.
#[derive(Clone, Default)]
pub struct InstanceEvents {
    /// Status changes, published only when the value changes.
    pub status: Broadcaster<Status>,
    /// Container output lines and diagnostics.
    pub terminal_out: Broadcaster<String>,
    /// Lines to write to the container's standard input.
    pub terminal_in: Broadcaster<String>,
}

impl InstanceEvents {
    /// Create an empty set of streams.
    pub fn new() -> Self {
        Self::default()
    }

    /// Close every stream.
    pub async fn close(&self) {
        self.status.close().await;
        self.terminal_out.close().await;
        self.terminal_in.close().await;
    }
}
