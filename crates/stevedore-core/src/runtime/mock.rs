// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock runtime for testing.
//!
//! Simulates containers and images in memory. Every call is recorded, any
//! operation can be made to fail, and attaching hands the test the other end
//! of the container's console.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{BufReader, DuplexStream};
use tokio::sync::Mutex;

use super::traits::*;

/// Runtime operations, used to select failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `list_containers`
    ListContainers,
    /// `list_images`
    ListImages,
    /// `pull_image`
    Pull,
    /// `create_container`
    Create,
    /// `start_container`
    Start,
    /// `stop_container`
    Stop,
    /// `kill_container`
    Kill,
    /// `inspect_container`
    Inspect,
    /// `attach_container`
    Attach,
}

/// A recorded runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    /// Containers were listed.
    ListContainers,
    /// Images were listed.
    ListImages,
    /// An image pull was requested.
    PullImage(String),
    /// A container was created.
    CreateContainer(ContainerSpec),
    /// A container was started.
    StartContainer(String),
    /// A container was stopped.
    StopContainer(String),
    /// A container was signalled.
    KillContainer(String, String),
    /// A container was inspected.
    InspectContainer(String),
    /// A container was attached.
    AttachContainer(String),
}

impl RuntimeCall {
    /// The operation this call belongs to.
    pub fn operation(&self) -> Operation {
        match self {
            RuntimeCall::ListContainers => Operation::ListContainers,
            RuntimeCall::ListImages => Operation::ListImages,
            RuntimeCall::PullImage(_) => Operation::Pull,
            RuntimeCall::CreateContainer(_) => Operation::Create,
            RuntimeCall::StartContainer(_) => Operation::Start,
            RuntimeCall::StopContainer(_) => Operation::Stop,
            RuntimeCall::KillContainer(_, _) => Operation::Kill,
            RuntimeCall::InspectContainer(_) => Operation::Inspect,
            RuntimeCall::AttachContainer(_) => Operation::Attach,
        }
    }
}

/// Test side of an attached container console.
pub struct MockConsole {
    /// Write here to produce container output.
    pub output: DuplexStream,
    /// Read here to observe what was written to the container's stdin.
    pub input: BufReader<DuplexStream>,
}

#[derive(Debug, Clone)]
struct MockContainer {
    summary: ContainerSummary,
    state: ContainerState,
}

#[derive(Default)]
struct MockState {
    containers: Vec<MockContainer>,
    images: Vec<ImageSummary>,
    pull_script: Option<Vec<PullProgress>>,
    failures: HashSet<Operation>,
    action_delay: Option<Duration>,
}

/// Mock runtime for testing.
pub struct MockRuntime {
    state: Mutex<MockState>,
    calls: Mutex<Vec<RuntimeCall>>,
    consoles: Mutex<HashMap<String, MockConsole>>,
    next_id: AtomicU64,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntime {
    /// Create an empty mock runtime: no containers, no images.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            calls: Mutex::new(Vec::new()),
            consoles: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> String {
        format!("mock-{:04}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Add an existing container and return its ID.
    pub async fn add_container(&self, name: &str, image: &str, state: ContainerState) -> String {
        let id = self.allocate_id();
        self.state.lock().await.containers.push(MockContainer {
            summary: ContainerSummary {
                id: id.clone(),
                names: vec![format!("/{}", name)],
                image: image.to_string(),
            },
            state,
        });
        id
    }

    /// Add a local image tagged as `image`.
    pub async fn add_image(&self, image: &str) {
        let id = self.allocate_id();
        self.state.lock().await.images.push(ImageSummary {
            id,
            repo_tags: vec![image.to_string()],
            labels: HashMap::new(),
        });
    }

    /// Replace the records produced by the next pulls.
    pub async fn set_pull_script(&self, records: Vec<PullProgress>) {
        self.state.lock().await.pull_script = Some(records);
    }

    /// Make every call of `operation` fail until cleared.
    pub async fn fail(&self, operation: Operation) {
        self.state.lock().await.failures.insert(operation);
    }

    /// Stop failing `operation`.
    pub async fn recover(&self, operation: Operation) {
        self.state.lock().await.failures.remove(&operation);
    }

    /// Delay start, stop, and kill calls.
    pub async fn set_action_delay(&self, delay: Duration) {
        self.state.lock().await.action_delay = Some(delay);
    }

    /// Change a container's state behind the engine's back.
    pub async fn set_state(&self, container_id: &str, state: ContainerState) {
        let mut guard = self.state.lock().await;
        if let Some(container) = guard
            .containers
            .iter_mut()
            .find(|c| c.summary.id == container_id)
        {
            container.state = state;
        }
    }

    /// Current state of a container.
    pub async fn state_of(&self, container_id: &str) -> Option<ContainerState> {
        self.state
            .lock()
            .await
            .containers
            .iter()
            .find(|c| c.summary.id == container_id)
            .map(|c| c.state.clone())
    }

    /// All recorded calls, oldest first.
    pub async fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().await.clone()
    }

    /// Number of recorded calls of `operation`.
    pub async fn call_count(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Take the console of an attached container.
    pub async fn take_console(&self, container_id: &str) -> Option<MockConsole> {
        self.consoles.lock().await.remove(container_id)
    }

    async fn record(&self, call: RuntimeCall) -> Result<()> {
        let operation = call.operation();
        self.calls.lock().await.push(call);

        let (failing, delay) = {
            let state = self.state.lock().await;
            (state.failures.contains(&operation), state.action_delay)
        };

        if matches!(operation, Operation::Start | Operation::Stop | Operation::Kill)
            && let Some(delay) = delay
        {
            tokio::time::sleep(delay).await;
        }

        if failing {
            return Err(RuntimeError::Api(format!("mock {:?} failure", operation)));
        }
        Ok(())
    }

    async fn transition(&self, container_id: &str, state: ContainerState) -> Result<()> {
        let mut guard = self.state.lock().await;
        let container = guard
            .containers
            .iter_mut()
            .find(|c| c.summary.id == container_id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(container_id.to_string()))?;
        container.state = state;
        Ok(())
    }
}

fn default_pull_script(image: &str) -> Vec<PullProgress> {
    vec![
        PullProgress::status(format!("Pulling from library/{}", image)),
        PullProgress {
            status: None,
            progress: Some("[=====>     ] 5MB/10MB".to_string()),
            error: None,
        },
        PullProgress::status("Download complete"),
        PullProgress::status(format!("Status: Downloaded newer image for {}", image)),
    ]
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn runtime_type(&self) -> &'static str {
        "mock"
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        self.record(RuntimeCall::ListContainers).await?;
        let state = self.state.lock().await;
        Ok(state.containers.iter().map(|c| c.summary.clone()).collect())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        self.record(RuntimeCall::ListImages).await?;
        Ok(self.state.lock().await.images.clone())
    }

    async fn pull_image(&self, image: &str) -> Result<PullStream> {
        self.record(RuntimeCall::PullImage(image.to_string())).await?;

        let records = {
            let mut state = self.state.lock().await;
            let records = state
                .pull_script
                .clone()
                .unwrap_or_else(|| default_pull_script(image));

            // A pull without error records leaves the image available.
            if records.iter().all(|r| r.error.is_none()) {
                state.images.push(ImageSummary {
                    id: format!("sha256:{}", image),
                    repo_tags: vec![image.to_string()],
                    labels: HashMap::new(),
                });
            }
            records
        };

        let stream = futures::stream::iter(records.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.record(RuntimeCall::CreateContainer(spec.clone())).await?;
        Ok(self
            .add_container(&spec.name, &spec.image, ContainerState::Created)
            .await)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.record(RuntimeCall::StartContainer(container_id.to_string()))
            .await?;
        self.transition(container_id, ContainerState::Running).await
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        self.record(RuntimeCall::StopContainer(container_id.to_string()))
            .await?;
        self.transition(container_id, ContainerState::Exited).await
    }

    async fn kill_container(&self, container_id: &str, signal: &str) -> Result<()> {
        self.record(RuntimeCall::KillContainer(
            container_id.to_string(),
            signal.to_string(),
        ))
        .await?;
        self.transition(container_id, ContainerState::Exited).await
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerState> {
        self.record(RuntimeCall::InspectContainer(container_id.to_string()))
            .await?;
        self.state_of(container_id)
            .await
            .ok_or_else(|| RuntimeError::ContainerNotFound(container_id.to_string()))
    }

    async fn attach_container(&self, container_id: &str) -> Result<Attachment> {
        self.record(RuntimeCall::AttachContainer(container_id.to_string()))
            .await?;

        let (output_test, output_engine) = tokio::io::duplex(4096);
        let (input_test, input_engine) = tokio::io::duplex(4096);

        self.consoles.lock().await.insert(
            container_id.to_string(),
            MockConsole {
                output: output_test,
                input: BufReader::new(input_test),
            },
        );

        Ok(Attachment {
            output: Box::pin(output_engine),
            input: Box::pin(input_engine),
        })
    }
}
