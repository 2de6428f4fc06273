// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-instance lifecycle loop.
//!
//! Every [`ServerInstance`] owns one background task that is the only writer
//! of its status and container ID. Actions reach the task through a channel
//! and are processed one at a time, in submission order. Each processed
//! action ends with a reconciliation pass that reads the container's real
//! state, and the submitter is answered only after that pass.
//!
//! The submission channel holds one pending action. A submitter still waits
//! for its reply, so the round trip matches a direct handoff: `submit`
//! returns only after the loop has processed and reconciled the action.
//!
//! Closing cancels the instance's token. The loop finishes the action in
//! flight, waits for the I/O attachment to stop, closes every event stream,
//! then reports done.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::events::Subscription;
use crate::instance::attach::attach;
use crate::instance::config::{DockerConfig, InstanceConfig};
use crate::instance::resolver::Resolver;
use crate::instance::{Action, InstanceEvents, Status};
use crate::runtime::{ContainerRuntime, ContainerState, KILL_SIGNAL};

/// Default period of idle reconciliation.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Options for spawning an instance.
#[derive(Debug, Clone)]
pub struct InstanceOptions {
    /// Reconcile this often while no action is in flight. `None` disables it.
    pub reconcile_interval: Option<Duration>,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            reconcile_interval: Some(DEFAULT_RECONCILE_INTERVAL),
        }
    }
}

#[derive(Debug)]
struct InstanceState {
    status: Status,
    container_id: Option<String>,
}

struct Submission {
    action: Action,
    reply: oneshot::Sender<Result<()>>,
}

/// A live server instance.
pub struct ServerInstance {
    id: Uuid,
    config: InstanceConfig,
    state: Arc<RwLock<InstanceState>>,
    events: InstanceEvents,
    submissions: mpsc::Sender<Submission>,
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

impl ServerInstance {
    /// Start the lifecycle loop for `config`.
    ///
    /// The loop first adopts an existing container named after the instance,
    /// if any, so a restarted process reports the real status without an
    /// explicit `Start`. Must be called within a tokio runtime.
    pub fn spawn(
        config: InstanceConfig,
        runtime: Arc<dyn ContainerRuntime>,
        options: InstanceOptions,
    ) -> Self {
        let id = config.id();
        let state = Arc::new(RwLock::new(InstanceState {
            status: Status::Initializing,
            container_id: None,
        }));
        let events = InstanceEvents::new();
        let cancel = CancellationToken::new();
        let (submissions, receiver) = mpsc::channel(1);
        let (done_tx, done) = watch::channel(false);

        let InstanceConfig::Docker(docker) = &config;
        let lifecycle = Lifecycle {
            id,
            config: docker.clone(),
            resolver: Resolver::new(runtime.clone(), events.terminal_out.clone()),
            runtime,
            state: state.clone(),
            events: events.clone(),
            cancel: cancel.clone(),
            reconcile_interval: options.reconcile_interval,
            attachment: None,
        };
        tokio::spawn(lifecycle.run(receiver, done_tx));

        info!(instance_id = %id, "Spawned server instance");

        Self {
            id,
            config,
            state,
            events,
            submissions,
            cancel,
            done,
        }
    }

    /// Instance ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Configuration the instance was spawned with.
    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    /// Current status.
    pub async fn status(&self) -> Status {
        self.state.read().await.status
    }

    /// Runtime container ID, once resolved.
    pub async fn container_id(&self) -> Option<String> {
        self.state.read().await.container_id.clone()
    }

    /// The instance's event streams.
    pub fn events(&self) -> &InstanceEvents {
        &self.events
    }

    /// Submit an action and wait until it is processed and reconciled.
    ///
    /// Only resolution failures are returned as errors. Invalid actions and
    /// failed runtime calls are reported on TerminalOut and still complete.
    pub async fn submit(&self, action: Action) -> Result<()> {
        let (reply, response) = oneshot::channel();

        self.submissions
            .send(Submission { action, reply })
            .await
            .map_err(|_| CoreError::InstanceClosed(self.id))?;

        response
            .await
            .map_err(|_| CoreError::InstanceClosed(self.id))?
    }

    /// Subscribe to status changes.
    pub async fn subscribe_status(&self) -> Subscription<Status> {
        self.events.status.subscribe().await
    }

    /// Subscribe to container output and diagnostics.
    pub async fn subscribe_terminal_out(&self) -> Subscription<String> {
        self.events.terminal_out.subscribe().await
    }

    /// Subscribe to lines sent to the container.
    pub async fn subscribe_terminal_in(&self) -> Subscription<String> {
        self.events.terminal_in.subscribe().await
    }

    /// Send a line to the container's standard input.
    ///
    /// Returns once the attachment has received it. Without an attachment the
    /// line is not delivered: a diagnostic goes to TerminalOut and
    /// [`CoreError::NotAttached`] is returned.
    pub async fn send_input(&self, line: impl Into<String>) -> Result<()> {
        if self.is_closed() {
            return Err(CoreError::InstanceClosed(self.id));
        }

        let line = line.into();
        if self.events.terminal_in.dispatch(line.clone()).await == 0 {
            warn!(instance_id = %self.id, "Dropped terminal input: not attached");
            self.events
                .terminal_out
                .dispatch(format!(
                    "Unable to send input, not attached to a container: {}",
                    line.trim_end()
                ))
                .await;
            return Err(CoreError::NotAttached(self.id));
        }
        Ok(())
    }

    /// Whether the lifecycle loop has exited.
    pub fn is_closed(&self) -> bool {
        *self.done.borrow()
    }

    /// Stop the lifecycle loop and wait for it to exit.
    ///
    /// An action in flight is completed first. Safe to call more than once
    /// and from several tasks.
    pub async fn close(&self) {
        self.cancel.cancel();
        let mut done = self.done.clone();
        let _ = done.wait_for(|done| *done).await;
    }
}

impl Drop for ServerInstance {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerInstance")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish()
    }
}

/// State owned by the background task.
struct Lifecycle {
    id: Uuid,
    config: DockerConfig,
    runtime: Arc<dyn ContainerRuntime>,
    resolver: Resolver,
    state: Arc<RwLock<InstanceState>>,
    events: InstanceEvents,
    cancel: CancellationToken,
    reconcile_interval: Option<Duration>,
    attachment: Option<JoinHandle<()>>,
}

impl Lifecycle {
    async fn run(mut self, mut submissions: mpsc::Receiver<Submission>, done: watch::Sender<bool>) {
        let cancel = self.cancel.clone();
        let interval = self.reconcile_interval;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = self.adopt() => {}
        }

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                submission = submissions.recv() => {
                    let Some(Submission { action, reply }) = submission else { break };
                    let result = self.process(action).await;
                    let _ = reply.send(result);
                }

                _ = tick(interval) => self.reconcile().await,
            }
        }

        // Unaccepted submissions are answered with InstanceClosed.
        drop(submissions);

        if let Some(attachment) = self.attachment.take() {
            let _ = attachment.await;
        }
        self.events.close().await;
        let _ = done.send(true);

        info!(instance_id = %self.id, "Server instance closed");
    }

    /// Take over a container left by an earlier run, if there is one.
    async fn adopt(&mut self) {
        match self.resolver.find_existing(&self.config).await {
            Ok(Some(container_id)) => {
                self.bind_container(container_id).await;
                self.reconcile().await;
            }
            Ok(None) => {
                debug!(instance_id = %self.id, "No existing container");
            }
            Err(e) => {
                warn!(instance_id = %self.id, error = %e, "Unable to adopt existing container");
                self.events
                    .terminal_out
                    .dispatch(format!("Unable to adopt existing container: {}", e))
                    .await;
            }
        }
    }

    async fn process(&mut self, action: Action) -> Result<()> {
        let (status, container_id) = {
            let state = self.state.read().await;
            (state.status, state.container_id.clone())
        };

        debug!(instance_id = %self.id, action = %action, status = %status, "Processing action");

        let result = match container_id {
            Some(container_id) => {
                self.apply(action, status, &container_id).await;
                Ok(())
            }
            None if action == Action::Start => self.resolve_and_start().await,
            None => {
                self.report(format!("Invalid {} action: {}", status, action))
                    .await;
                Ok(())
            }
        };

        self.reconcile().await;
        result
    }

    async fn resolve_and_start(&mut self) -> Result<()> {
        let resolved = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(CoreError::InstanceClosed(self.id)),
            resolved = self.resolver.resolve(&self.config) => resolved,
        };

        match resolved {
            Ok(container_id) => {
                self.bind_container(container_id.clone()).await;
                self.start(&container_id).await;
                Ok(())
            }
            Err(e) => {
                self.set_status(Status::Errored).await;
                self.report(format!("Unable to get container: {}", e)).await;
                Err(e.into())
            }
        }
    }

    async fn apply(&self, action: Action, status: Status, container_id: &str) {
        match (status, action) {
            (Status::Idle, Action::Start) => self.start(container_id).await,
            (Status::Running, Action::Stop) => {
                self.set_status(Status::Stopping).await;
                if let Err(e) = self.runtime.stop_container(container_id).await {
                    self.report(format!("Unable to stop container: {}", e)).await;
                }
            }
            (Status::Running, Action::Kill) => {
                self.set_status(Status::Stopping).await;
                if let Err(e) = self.runtime.kill_container(container_id, KILL_SIGNAL).await {
                    self.report(format!("Unable to kill container: {}", e)).await;
                }
            }
            _ => {
                self.report(format!("Invalid {} action: {}", status, action))
                    .await
            }
        }
    }

    async fn start(&self, container_id: &str) {
        self.set_status(Status::Starting).await;
        if let Err(e) = self.runtime.start_container(container_id).await {
            self.report(format!("Unable to start container: {}", e)).await;
        }
    }

    /// Record the container ID and attach to its console.
    async fn bind_container(&mut self, container_id: String) {
        self.state.write().await.container_id = Some(container_id.clone());

        if let Some(previous) = self.attachment.take() {
            previous.abort();
        }
        self.attachment = Some(tokio::spawn(attach(
            self.id,
            container_id,
            self.runtime.clone(),
            self.events.clone(),
            self.cancel.clone(),
        )));
    }

    /// Read the container's real state and publish the matching status.
    async fn reconcile(&self) {
        let container_id = self.state.read().await.container_id.clone();
        let Some(container_id) = container_id else {
            return;
        };

        match self.runtime.inspect_container(&container_id).await {
            Ok(ContainerState::Created | ContainerState::Exited) => {
                self.set_status(Status::Idle).await
            }
            Ok(ContainerState::Running) => self.set_status(Status::Running).await,
            Ok(other) => {
                self.report(format!("Unknown docker status: {}", other))
                    .await;
                self.set_status(Status::Errored).await;
            }
            Err(e) => {
                self.report(format!("Unable to inspect container: {}", e))
                    .await
            }
        }
    }

    /// Store `status` and publish it if it changed.
    async fn set_status(&self, status: Status) {
        {
            let mut state = self.state.write().await;
            if state.status == status {
                return;
            }
            state.status = status;
        }

        info!(instance_id = %self.id, status = %status, "Status changed");
        self.events.status.dispatch(status).await;
    }

    /// Publish a diagnostic on TerminalOut.
    async fn report(&self, message: String) {
        error!(instance_id = %self.id, "{}", message);
        self.events.terminal_out.dispatch(message).await;
    }
}

async fn tick(interval: Option<Duration>) {
    match interval {
        Some(interval) => tokio::time::sleep(interval).await,
        None => std::future::pending().await,
    }
}
