// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared helpers for stevedore-environment integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use stevedore_core::{InstanceOptions, MockRuntime, ServerInstance, ServerManager};
use stevedore_environment::connect_persistence;
use tower::ServiceExt;

/// Manager over an in-memory SQLite store and a mock runtime, with periodic
/// reconciliation turned off.
pub async fn test_manager() -> (Arc<ServerManager>, Arc<MockRuntime>) {
    let persistence = connect_persistence("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite store");
    let runtime = Arc::new(MockRuntime::new());
    let manager = ServerManager::new(
        persistence,
        runtime.clone(),
        InstanceOptions {
            reconcile_interval: None,
        },
    );
    (Arc::new(manager), runtime)
}

/// Send one request through the router and decode the JSON response body.
pub async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };

    (status, value)
}

/// Poll until the instance's attachment listens on TerminalIn.
pub async fn wait_for_attachment(instance: &ServerInstance) {
    for _ in 0..200 {
        if instance.events().terminal_in.subscriber_count().await > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("instance never attached to its container");
}
