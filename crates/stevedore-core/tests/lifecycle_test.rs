// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle tests for server instances, driven against the mock runtime.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use stevedore_core::runtime::{
    ContainerState, KILL_SIGNAL, MockRuntime, Operation, PortBinding, RuntimeCall,
};
use stevedore_core::{Action, CoreError, InstanceOptions, ServerInstance, Status};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

// ============================================================================
// Start from an empty runtime
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_pulls_creates_and_runs() {
    let runtime = Arc::new(MockRuntime::new());
    let config = docker_config("x", &["8080:80/tcp"]);
    let instance = ServerInstance::spawn(config.clone(), runtime.clone(), no_periodic());

    let statuses = collect(instance.subscribe_status().await);
    let output = collect(instance.subscribe_terminal_out().await);

    instance
        .submit(Action::Start)
        .await
        .expect("start should succeed");
    assert_eq!(instance.status().await, Status::Running);
    assert!(instance.container_id().await.is_some());

    instance.close().await;

    assert_eq!(
        statuses.await.unwrap(),
        vec![Status::Starting, Status::Running]
    );

    let output = output.await.unwrap();
    assert_eq!(output[0], "Pulling image \"x\"");
    assert!(output.len() > 1);
    assert!(output[1..].iter().all(|line| line.starts_with("[Docker] ")));

    let creates: Vec<_> = runtime
        .calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            RuntimeCall::CreateContainer(spec) => Some(spec),
            _ => None,
        })
        .collect();
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].name, config.id().to_string());
    assert_eq!(creates[0].image, "x");
    assert_eq!(
        creates[0].ports,
        vec![PortBinding {
            host_port: 8080,
            container_port: "80/tcp".to_string(),
        }]
    );
    assert!(creates[0].binds.is_empty());
}

// ============================================================================
// Invalid actions
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_while_idle_is_reported() {
    let runtime = Arc::new(MockRuntime::new());
    let config = docker_config("nginx", &[]);
    runtime
        .add_container(&config.id().to_string(), "nginx", ContainerState::Exited)
        .await;

    let instance = ServerInstance::spawn(config, runtime.clone(), no_periodic());
    wait_for_status(&instance, Status::Idle).await;

    let statuses = collect(instance.subscribe_status().await);
    let output = collect(instance.subscribe_terminal_out().await);

    instance
        .submit(Action::Stop)
        .await
        .expect("invalid actions still complete");
    assert_eq!(instance.status().await, Status::Idle);
    assert_eq!(runtime.call_count(Operation::Stop).await, 0);

    instance.close().await;
    assert!(statuses.await.unwrap().is_empty());
    assert_eq!(output.await.unwrap(), vec!["Invalid Idle action: Stop"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_non_start_action_without_container_is_reported() {
    let runtime = Arc::new(MockRuntime::new());
    let instance = ServerInstance::spawn(docker_config("nginx", &[]), runtime.clone(), no_periodic());
    let output = collect(instance.subscribe_terminal_out().await);

    instance.submit(Action::Kill).await.unwrap();

    assert_eq!(instance.status().await, Status::Initializing);
    assert_eq!(runtime.call_count(Operation::Create).await, 0);

    instance.close().await;
    assert_eq!(
        output.await.unwrap(),
        vec!["Invalid Initializing action: Kill"]
    );
}

// ============================================================================
// Runtime call failures
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_kill_is_reconciled() {
    let runtime = Arc::new(MockRuntime::new());
    let config = docker_config("nginx", &[]);
    let container_id = runtime
        .add_container(&config.id().to_string(), "nginx", ContainerState::Running)
        .await;

    let instance = ServerInstance::spawn(config, runtime.clone(), no_periodic());
    wait_for_status(&instance, Status::Running).await;

    let statuses = collect(instance.subscribe_status().await);
    let output = collect(instance.subscribe_terminal_out().await);
    runtime.fail(Operation::Kill).await;

    instance
        .submit(Action::Kill)
        .await
        .expect("runtime call failures are not returned");

    assert_eq!(instance.status().await, Status::Running);
    assert!(
        runtime
            .calls()
            .await
            .contains(&RuntimeCall::KillContainer(container_id, KILL_SIGNAL.to_string()))
    );

    instance.close().await;
    assert_eq!(
        statuses.await.unwrap(),
        vec![Status::Stopping, Status::Running]
    );
    let output = output.await.unwrap();
    assert_eq!(output.len(), 1);
    assert!(output[0].starts_with("Unable to kill container:"), "{}", output[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_and_restart() {
    let runtime = Arc::new(MockRuntime::new());
    let config = docker_config("nginx", &[]);
    runtime
        .add_container(&config.id().to_string(), "nginx", ContainerState::Running)
        .await;

    let instance = ServerInstance::spawn(config, runtime.clone(), no_periodic());
    wait_for_status(&instance, Status::Running).await;
    let statuses = collect(instance.subscribe_status().await);

    instance.submit(Action::Stop).await.unwrap();
    assert_eq!(instance.status().await, Status::Idle);
    instance.submit(Action::Start).await.unwrap();
    assert_eq!(instance.status().await, Status::Running);

    instance.close().await;
    assert_eq!(
        statuses.await.unwrap(),
        vec![
            Status::Stopping,
            Status::Idle,
            Status::Starting,
            Status::Running
        ]
    );
    assert_eq!(runtime.call_count(Operation::Create).await, 0);
}

// ============================================================================
// Resolution
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resolution_failure_errors_then_recovers() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.fail(Operation::Pull).await;

    let instance = ServerInstance::spawn(docker_config("ghost", &[]), runtime.clone(), no_periodic());
    let output = collect(instance.subscribe_terminal_out().await);

    let err = instance.submit(Action::Start).await.unwrap_err();
    assert!(matches!(err, CoreError::Resolve(_)), "{err:?}");
    assert_eq!(instance.status().await, Status::Errored);
    assert!(instance.container_id().await.is_none());

    // A later Start is the explicit retry.
    runtime.recover(Operation::Pull).await;
    instance.submit(Action::Start).await.unwrap();
    assert_eq!(instance.status().await, Status::Running);

    instance.close().await;
    let output = output.await.unwrap();
    assert!(
        output
            .iter()
            .any(|line| line.starts_with("Unable to get container:")),
        "{output:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_adoption_reports_existing_container_status() {
    let runtime = Arc::new(MockRuntime::new());
    let config = docker_config("nginx", &[]);
    let container_id = runtime
        .add_container(&config.id().to_string(), "nginx", ContainerState::Running)
        .await;

    let instance = ServerInstance::spawn(config, runtime.clone(), no_periodic());
    wait_for_status(&instance, Status::Running).await;

    assert_eq!(instance.container_id().await, Some(container_id));
    assert_eq!(runtime.call_count(Operation::Create).await, 0);
    assert_eq!(runtime.call_count(Operation::Pull).await, 0);
    instance.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_adoption_refuses_mismatched_image() {
    let runtime = Arc::new(MockRuntime::new());
    let config = docker_config("nginx:1.27", &[]);
    runtime
        .add_container(&config.id().to_string(), "nginx:1.25", ContainerState::Running)
        .await;

    let instance = ServerInstance::spawn(config, runtime.clone(), no_periodic());

    let err = instance.submit(Action::Start).await.unwrap_err();
    assert!(
        err.to_string().contains("non-matching container image"),
        "{err}"
    );
    assert_eq!(instance.status().await, Status::Errored);
    assert_eq!(runtime.call_count(Operation::Start).await, 0);
    instance.close().await;
}

// ============================================================================
// Serialization
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_actions_are_serialized() {
    let runtime = Arc::new(MockRuntime::new());
    let config = docker_config("nginx", &[]);
    runtime
        .add_container(&config.id().to_string(), "nginx", ContainerState::Exited)
        .await;
    runtime.set_action_delay(Duration::from_millis(100)).await;

    let instance = spawn_shared(config, runtime.clone(), no_periodic());
    wait_for_status(&instance, Status::Idle).await;
    let output = collect(instance.subscribe_terminal_out().await);

    let starter = {
        let instance = instance.clone();
        tokio::spawn(async move { instance.submit(Action::Start).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Submitted while Start is in flight; it must observe Start's outcome.
    instance.submit(Action::Stop).await.unwrap();
    starter.await.unwrap().unwrap();

    assert_eq!(instance.status().await, Status::Idle);
    let actions: Vec<_> = runtime
        .calls()
        .await
        .into_iter()
        .filter(|call| {
            matches!(
                call,
                RuntimeCall::StartContainer(_) | RuntimeCall::StopContainer(_)
            )
        })
        .collect();
    assert!(matches!(
        actions.as_slice(),
        [RuntimeCall::StartContainer(_), RuntimeCall::StopContainer(_)]
    ));

    instance.close().await;
    assert!(output.await.unwrap().is_empty(), "no invalid actions expected");
}

// ============================================================================
// Close
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_completes_in_flight_action() {
    let runtime = Arc::new(MockRuntime::new());
    let config = docker_config("nginx", &[]);
    runtime
        .add_container(&config.id().to_string(), "nginx", ContainerState::Exited)
        .await;
    runtime.set_action_delay(Duration::from_millis(200)).await;

    let instance = spawn_shared(config, runtime.clone(), no_periodic());
    wait_for_status(&instance, Status::Idle).await;

    let submit = {
        let instance = instance.clone();
        tokio::spawn(async move { instance.submit(Action::Start).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    instance.close().await;

    assert!(instance.is_closed());
    submit
        .await
        .unwrap()
        .expect("in-flight action should complete");
    assert_eq!(instance.status().await, Status::Running);
    assert!(runtime.call_count(Operation::Inspect).await >= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_submit_after_close_fails() {
    let runtime = Arc::new(MockRuntime::new());
    let instance = ServerInstance::spawn(docker_config("nginx", &[]), runtime, no_periodic());

    instance.close().await;
    instance.close().await;

    let err = instance.submit(Action::Start).await.unwrap_err();
    assert!(matches!(err, CoreError::InstanceClosed(id) if id == instance.id()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_ends_subscriptions() {
    let runtime = Arc::new(MockRuntime::new());
    let instance = ServerInstance::spawn(docker_config("nginx", &[]), runtime, no_periodic());
    let mut status = instance.subscribe_status().await;
    let mut output = instance.subscribe_terminal_out().await;

    instance.close().await;

    assert_eq!(status.recv().await, None);
    assert_eq!(output.recv().await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscribe_after_close_ends() {
    let runtime = Arc::new(MockRuntime::new());
    let instance = ServerInstance::spawn(docker_config("nginx", &[]), runtime, no_periodic());
    instance.close().await;

    let mut status = instance.subscribe_status().await;
    let mut output = instance.subscribe_terminal_out().await;

    let ended = tokio::time::timeout(Duration::from_secs(1), async {
        (status.recv().await, output.recv().await)
    })
    .await
    .expect("subscriptions on a closed instance should end");
    assert_eq!(ended, (None, None));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_waits_on_runtime_call_that_never_returns() {
    let runtime = Arc::new(MockRuntime::new());
    let config = docker_config("nginx", &[]);
    runtime
        .add_container(&config.id().to_string(), "nginx", ContainerState::Exited)
        .await;
    runtime.set_action_delay(Duration::from_secs(3600)).await;

    let instance = spawn_shared(config, runtime.clone(), no_periodic());
    wait_for_status(&instance, Status::Idle).await;

    let submit = {
        let instance = instance.clone();
        tokio::spawn(async move { instance.submit(Action::Start).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Runtime calls are not bounded, so close cannot finish while one hangs.
    let closed = tokio::time::timeout(Duration::from_millis(500), instance.close()).await;
    assert!(closed.is_err());
    assert!(!instance.is_closed());
    assert!(!submit.is_finished());

    submit.abort();
}

// ============================================================================
// Reconciliation
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_periodic_reconciliation_publishes_changes_only() {
    let runtime = Arc::new(MockRuntime::new());
    let config = docker_config("nginx", &[]);
    let container_id = runtime
        .add_container(&config.id().to_string(), "nginx", ContainerState::Running)
        .await;

    let options = InstanceOptions {
        reconcile_interval: Some(Duration::from_millis(20)),
    };
    let instance = ServerInstance::spawn(config, runtime.clone(), options);
    wait_for_status(&instance, Status::Running).await;
    let statuses = collect(instance.subscribe_status().await);

    // Several passes over an unchanged container publish nothing.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(runtime.call_count(Operation::Inspect).await >= 3);

    runtime.set_state(&container_id, ContainerState::Exited).await;
    wait_for_status(&instance, Status::Idle).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    instance.close().await;
    assert_eq!(statuses.await.unwrap(), vec![Status::Idle]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_container_state_errors() {
    let runtime = Arc::new(MockRuntime::new());
    let config = docker_config("nginx", &[]);
    let container_id = runtime
        .add_container(&config.id().to_string(), "nginx", ContainerState::Running)
        .await;

    let options = InstanceOptions {
        reconcile_interval: Some(Duration::from_millis(20)),
    };
    let instance = ServerInstance::spawn(config, runtime.clone(), options);
    wait_for_status(&instance, Status::Running).await;
    let mut output = instance.subscribe_terminal_out().await;

    runtime.set_state(&container_id, ContainerState::Paused).await;

    let line = tokio::time::timeout(Duration::from_secs(2), output.recv())
        .await
        .expect("diagnostic expected")
        .unwrap();
    assert_eq!(line, "Unknown docker status: paused");
    wait_for_status(&instance, Status::Errored).await;

    instance.events().terminal_out.unsubscribe(output).await;
    instance.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_inspection_failure_keeps_status() {
    let runtime = Arc::new(MockRuntime::new());
    let config = docker_config("nginx", &[]);
    runtime
        .add_container(&config.id().to_string(), "nginx", ContainerState::Exited)
        .await;

    let instance = ServerInstance::spawn(config, runtime.clone(), no_periodic());
    wait_for_status(&instance, Status::Idle).await;
    let output = collect(instance.subscribe_terminal_out().await);

    runtime.fail(Operation::Inspect).await;
    instance.submit(Action::Stop).await.unwrap();
    assert_eq!(instance.status().await, Status::Idle);

    instance.close().await;
    let output = output.await.unwrap();
    assert_eq!(output[0], "Invalid Idle action: Stop");
    assert!(output[1].starts_with("Unable to inspect container:"));
}

// ============================================================================
// Terminal I/O
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_terminal_bridging() {
    let runtime = Arc::new(MockRuntime::new());
    let config = docker_config("nginx", &[]);
    let container_id = runtime
        .add_container(&config.id().to_string(), "nginx", ContainerState::Running)
        .await;

    let instance = ServerInstance::spawn(config, runtime.clone(), no_periodic());
    wait_for_status(&instance, Status::Running).await;
    wait_for_attachment(&instance).await;

    let mut console = runtime.take_console(&container_id).await.unwrap();
    let mut output = instance.subscribe_terminal_out().await;

    console.output.write_all(b"[Server] Ready\n").await.unwrap();
    let line = tokio::time::timeout(Duration::from_secs(2), output.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line, "[Server] Ready");

    instance
        .send_input("say hello")
        .await
        .expect("attached instance should accept input");
    let mut received = String::new();
    console.input.read_line(&mut received).await.unwrap();
    assert_eq!(received, "say hello\n");

    instance.events().terminal_out.unsubscribe(output).await;
    instance.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_send_input_without_attachment_is_reported() {
    let runtime = Arc::new(MockRuntime::new());
    let instance = ServerInstance::spawn(docker_config("nginx", &[]), runtime, no_periodic());
    let mut output = instance.subscribe_terminal_out().await;

    let reader = tokio::spawn(async move { output.recv().await });

    let err = instance.send_input("say hello").await.unwrap_err();
    assert!(matches!(err, CoreError::NotAttached(id) if id == instance.id()));

    let diagnostic = tokio::time::timeout(Duration::from_secs(1), reader)
        .await
        .unwrap()
        .unwrap()
        .expect("diagnostic should be published");
    assert!(diagnostic.contains("not attached"), "{diagnostic}");
    assert!(diagnostic.contains("say hello"));

    instance.close().await;
    let err = instance.send_input("say hello").await.unwrap_err();
    assert!(matches!(err, CoreError::InstanceClosed(_)));
}
