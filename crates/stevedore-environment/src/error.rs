// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for stevedore-environment.

use thiserror::Error;

/// Environment errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Docker client could not be created.
    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// Core operation failed.
    #[error("Core error: {0}")]
    Core(#[from] stevedore_core::CoreError),

    /// The database URL names no supported backend.
    #[error("Unsupported database URL: {0}")]
    UnsupportedDatabase(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type using Environment Error.
pub type Result<T> = std::result::Result<T, Error>;
