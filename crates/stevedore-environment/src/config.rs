// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for stevedore-environment.

use std::net::SocketAddr;
use std::time::Duration;

/// Environment configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL, `postgres://...` or `sqlite:...`
    pub database_url: String,
    /// HTTP API address
    pub http_addr: SocketAddr,
    /// Idle reconciliation period; `None` disables it
    pub reconcile_interval: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("STEVEDORE_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .map_err(|_| ConfigError::MissingEnvVar("STEVEDORE_DATABASE_URL or DATABASE_URL"))?;

        let port: u16 = std::env::var("STEVEDORE_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let interval_secs: u64 = std::env::var("STEVEDORE_RECONCILE_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidInterval)?;

        let reconcile_interval = (interval_secs > 0).then(|| Duration::from_secs(interval_secs));

        Ok(Self {
            database_url,
            http_addr,
            reconcile_interval,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// The port number is invalid.
    #[error("Invalid port number")]
    InvalidPort,
    /// The reconciliation interval is not a whole number of seconds.
    #[error("Invalid reconciliation interval")]
    InvalidInterval,
}
