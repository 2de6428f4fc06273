// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Terminal I/O bridging between a container and an instance's event streams.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

use crate::instance::InstanceEvents;
use crate::runtime::ContainerRuntime;

/// Attach to a container and bridge its console until cancelled.
///
/// Output is read line by line on a separate task and published on
/// TerminalOut. Lines received on TerminalIn are written to the container's
/// stdin with a trailing newline. The first write failure publishes a
/// diagnostic and ends the attachment; there is no re-attachment.
pub async fn attach(
    instance_id: Uuid,
    container_id: String,
    runtime: Arc<dyn ContainerRuntime>,
    events: InstanceEvents,
    cancel: CancellationToken,
) {
    let attachment = match runtime.attach_container(&container_id).await {
        Ok(attachment) => attachment,
        Err(e) => {
            let message = format!("Unable to attach to container: {}", e);
            error!(instance_id = %instance_id, container_id = %container_id, "{}", message);
            events.terminal_out.dispatch(message).await;
            return;
        }
    };

    debug!(instance_id = %instance_id, container_id = %container_id, "Attached to container");

    let mut input = attachment.input;
    let mut terminal_in = events.terminal_in.subscribe().await;

    let reader = {
        let terminal_out = events.terminal_out.clone();
        let cancel = cancel.clone();
        let mut lines = BufReader::new(attachment.output).lines();

        tokio::spawn(async move {
            loop {
                let line = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    line = lines.next_line() => line,
                };

                // Stream end and read errors both end the reader quietly.
                let Ok(Some(line)) = line else { break };

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = terminal_out.dispatch(line) => {}
                }
            }
        })
    };

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = terminal_in.recv() => line,
        };

        let Some(mut line) = line else { break };
        if !line.ends_with('\n') {
            line.push('\n');
        }

        debug!(instance_id = %instance_id, command = %line.trim_end(), "Executing command");

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            written = async {
                input.write_all(line.as_bytes()).await?;
                input.flush().await
            } => written,
        };

        if let Err(e) = written {
            let message = format!("Error writing to container: {}", e);
            error!(instance_id = %instance_id, container_id = %container_id, "{}", message);
            events.terminal_out.dispatch(message).await;
            break;
        }
    }

    events.terminal_in.unsubscribe(terminal_in).await;
    reader.abort();
    let _ = reader.await;
    debug!(instance_id = %instance_id, container_id = %container_id, "Detached from container");
}
