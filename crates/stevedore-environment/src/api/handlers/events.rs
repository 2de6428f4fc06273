// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Server-Sent Events stream of a server's status and terminal output.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::Result;

/// GET /api/servers/{id}/events
///
/// Emits `status` events carrying the status name and `terminal` events
/// carrying one output line each. The stream ends when the server closes.
pub async fn server_events(
    State(manager): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let instance = manager.get_instance(id).await?;

    let status = instance
        .subscribe_status()
        .await
        .into_stream()
        .map(|status| Event::default().event("status").data(status.as_str()));
    let terminal = instance
        .subscribe_terminal_out()
        .await
        .into_stream()
        .map(|line| Event::default().event("terminal").data(line.replace('\r', "")));

    let events = stream::select(status, terminal).map(Ok);

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
