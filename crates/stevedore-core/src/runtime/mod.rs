// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container runtime abstraction.
//!
//! The lifecycle engine drives containers only through [`ContainerRuntime`].
//! The Docker implementation lives in stevedore-environment; [`MockRuntime`]
//! keeps everything in memory for tests.

pub mod mock;
mod traits;

pub use mock::{MockRuntime, Operation, RuntimeCall};
pub use traits::*;
