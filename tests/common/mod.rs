//! In-memory container engine shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::BytesMut;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::codec::{Decoder, Encoder};
use world_cli::container::{
    BuildEvent, BuildRequest, ContainerError, Engine, ExecOutput, LogFrame, LogFrameCodec,
    ProcessState, RegistryAuth, Result, ServiceDescriptor, TransferProgress,
};

/// Engine operations in the order they were issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(String),
    Start(String),
    Stop(String),
    Remove(String),
    Pull(String),
    Build(String),
    Tag(String, String),
    Push(String),
    CreateNetwork(String),
    CreateVolume(String),
    RemoveVolume(String),
    Exec(String),
}

#[derive(Default)]
struct State {
    /// Container name to running flag
    containers: HashMap<String, bool>,
    created: HashMap<String, ServiceDescriptor>,
    images: HashSet<String>,
    networks: Vec<String>,
    volumes: Vec<String>,
    calls: Vec<Call>,
    fail_start: HashSet<String>,
    fail_pull: HashSet<String>,
    fail_remove: HashSet<String>,
    fail_logs: HashSet<String>,
    /// Networks and volumes left out of list results
    hidden: HashSet<String>,
    pull_progress: Vec<TransferProgress>,
    build_events: Vec<BuildEvent>,
    builds: Vec<BuildRequest>,
    pushes: Vec<(String, Option<RegistryAuth>)>,
    /// One batch of encoded frames is replayed per attach
    logs: HashMap<String, VecDeque<BytesMut>>,
    log_attaches: Vec<(String, Option<i64>)>,
    exec_outputs: VecDeque<ExecOutput>,
}

/// Engine that keeps containers, images, networks, and volumes in memory.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<State>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_image(&self, image: &str) {
        self.state().images.insert(image.to_string());
    }

    pub fn fail_start(&self, name: &str) {
        self.state().fail_start.insert(name.to_string());
    }

    pub fn fail_pull(&self, image: &str) {
        self.state().fail_pull.insert(image.to_string());
    }

    pub fn fail_remove(&self, name: &str) {
        self.state().fail_remove.insert(name.to_string());
    }

    /// Make the next log attach for `name` fail after replaying its batch.
    pub fn fail_logs(&self, name: &str) {
        self.state().fail_logs.insert(name.to_string());
    }

    /// Leave `name` out of network and volume listings while it still exists.
    pub fn hide_from_list(&self, name: &str) {
        self.state().hidden.insert(name.to_string());
    }

    pub fn set_pull_progress(&self, progress: Vec<TransferProgress>) {
        self.state().pull_progress = progress;
    }

    pub fn set_build_events(&self, events: Vec<BuildEvent>) {
        self.state().build_events = events;
    }

    /// Queue `frames` in the wire format; each attach replays the next batch.
    pub fn set_logs(&self, name: &str, frames: Vec<LogFrame>) {
        let mut buf = BytesMut::new();
        for frame in frames {
            LogFrameCodec.encode(frame, &mut buf).unwrap();
        }
        self.state()
            .logs
            .entry(name.to_string())
            .or_default()
            .push_back(buf);
    }

    /// Every log attach as `(container, since)`.
    pub fn log_attaches(&self) -> Vec<(String, Option<i64>)> {
        self.state().log_attaches.clone()
    }

    pub fn push_exec_output(&self, stdout: &str, exit_code: i64) {
        self.state().exec_outputs.push_back(ExecOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(exit_code),
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.state().containers.get(name).copied().unwrap_or(false)
    }

    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state().containers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn created(&self, name: &str) -> Option<ServiceDescriptor> {
        self.state().created.get(name).cloned()
    }

    pub fn networks(&self) -> Vec<String> {
        self.state().networks.clone()
    }

    pub fn volumes(&self) -> Vec<String> {
        self.state().volumes.clone()
    }

    pub fn builds(&self) -> Vec<BuildRequest> {
        self.state().builds.clone()
    }

    pub fn pushes(&self) -> Vec<(String, Option<RegistryAuth>)> {
        self.state().pushes.clone()
    }
}

#[async_trait]
impl Engine for FakeEngine {
    fn buildkit_supported(&self) -> bool {
        false
    }

    async fn container_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state().containers.contains_key(name))
    }

    async fn container_running(&self, name: &str) -> Result<bool> {
        Ok(self.is_running(name))
    }

    async fn create_container(&self, service: &ServiceDescriptor) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::Create(service.name.clone()));
        if state.containers.contains_key(&service.name) {
            return Err(ContainerError::AlreadyExists(service.name.clone()));
        }
        state.containers.insert(service.name.clone(), false);
        state.created.insert(service.name.clone(), service.clone());
        Ok(())
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.calls.push(Call::Start(name.to_string()));
        if state.fail_start.contains(name) {
            return Err(ContainerError::Other(format!("port already allocated for {}", name)));
        }
        match state.containers.get_mut(name) {
            Some(running) => {
                *running = true;
                Ok(())
            }
            None => Err(ContainerError::NotFound(name.to_string())),
        }
    }

    async fn stop_container(&self, name: &str, _grace: Duration) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.calls.push(Call::Stop(name.to_string()));
        match state.containers.get_mut(name) {
            Some(running) => {
                *running = false;
                Ok(())
            }
            None => Err(ContainerError::NotFound(name.to_string())),
        }
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::Remove(name.to_string()));
        if state.fail_remove.contains(name) {
            return Err(ContainerError::Other(format!("device busy removing {}", name)));
        }
        match state.containers.get(name) {
            Some(true) => Err(ContainerError::Other(format!("{} is running", name))),
            Some(false) => {
                state.containers.remove(name);
                state.created.remove(name);
                Ok(())
            }
            None => Err(ContainerError::NotFound(name.to_string())),
        }
    }

    async fn exec(&self, name: &str, _cmd: &[String]) -> Result<ExecOutput> {
        let mut state = self.state();
        state.calls.push(Call::Exec(name.to_string()));
        if !state.containers.get(name).copied().unwrap_or(false) {
            return Err(ContainerError::ExecutionError(format!("{} is not running", name)));
        }
        Ok(state.exec_outputs.pop_front().unwrap_or(ExecOutput {
            stdout: String::new(),
            stderr: "not ready".to_string(),
            exit_code: Some(1),
        }))
    }

    async fn stream_logs(
        &self,
        name: &str,
        since: Option<i64>,
        on_frame: &mut (dyn FnMut(LogFrame) + Send),
    ) -> Result<()> {
        let (frames, fail) = {
            let mut state = self.state();
            state.log_attaches.push((name.to_string(), since));
            let mut frames = Vec::new();
            if let Some(mut buf) = state.logs.get_mut(name).and_then(VecDeque::pop_front) {
                while let Some(frame) = LogFrameCodec.decode(&mut buf)? {
                    frames.push(frame);
                }
            }
            (frames, state.fail_logs.remove(name))
        };

        for frame in frames {
            on_frame(frame);
        }
        if fail {
            return Err(ContainerError::StreamError(format!(
                "connection reset reading logs of {}",
                name
            )));
        }

        // A live container keeps its log stream open
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.state().images.contains(image))
    }

    async fn pull_image(
        &self,
        image: &str,
        on_progress: &mut (dyn FnMut(TransferProgress) + Send),
    ) -> Result<()> {
        let progress = {
            let mut state = self.state();
            state.calls.push(Call::Pull(image.to_string()));
            if state.fail_pull.contains(image) {
                return Err(ContainerError::PullFailed {
                    image: image.to_string(),
                    reason: "manifest unknown".to_string(),
                });
            }
            state.pull_progress.clone()
        };

        for update in progress {
            on_progress(update);
        }
        self.state().images.insert(image.to_string());
        Ok(())
    }

    async fn build_image(
        &self,
        request: BuildRequest,
        on_event: &mut (dyn FnMut(BuildEvent) -> Result<()> + Send),
    ) -> Result<()> {
        let events = {
            let mut state = self.state();
            state.calls.push(Call::Build(request.tag.clone()));
            state.builds.push(request.clone());
            state.build_events.clone()
        };

        for event in events {
            on_event(event)?;
        }
        self.state().images.insert(request.tag);
        Ok(())
    }

    async fn tag_image(&self, image: &str, target: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::Tag(image.to_string(), target.to_string()));
        if !state.images.contains(image) {
            return Err(ContainerError::NotFound(image.to_string()));
        }
        state.images.insert(target.to_string());
        Ok(())
    }

    async fn push_image(
        &self,
        image: &str,
        auth: Option<&RegistryAuth>,
        on_progress: &mut (dyn FnMut(TransferProgress) + Send),
    ) -> Result<()> {
        {
            let mut state = self.state();
            state.calls.push(Call::Push(image.to_string()));
            state.pushes.push((image.to_string(), auth.cloned()));
        }
        on_progress(TransferProgress {
            id: Some("layer".to_string()),
            status: Some("Pushing".to_string()),
            current: Some(1),
            total: Some(1),
        });
        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<String>> {
        let state = self.state();
        Ok(visible(&state.networks, &state.hidden))
    }

    async fn create_network(&self, name: &str, _driver: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::CreateNetwork(name.to_string()));
        if state.networks.iter().any(|n| n == name) {
            return Err(ContainerError::AlreadyExists(name.to_string()));
        }
        state.networks.push(name.to_string());
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<String>> {
        let state = self.state();
        Ok(visible(&state.volumes, &state.hidden))
    }

    async fn create_volume(&self, name: &str, _driver: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::CreateVolume(name.to_string()));
        if state.volumes.iter().any(|v| v == name) {
            return Err(ContainerError::AlreadyExists(name.to_string()));
        }
        state.volumes.push(name.to_string());
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::RemoveVolume(name.to_string()));
        if state.containers.values().any(|running| *running) {
            return Err(ContainerError::Other(format!("volume {} is in use", name)));
        }
        match state.volumes.iter().position(|v| v == name) {
            Some(index) => {
                state.volumes.remove(index);
                Ok(())
            }
            None => Err(ContainerError::NotFound(name.to_string())),
        }
    }
}

fn visible(names: &[String], hidden: &HashSet<String>) -> Vec<String> {
    names
        .iter()
        .filter(|name| !hidden.contains(*name))
        .cloned()
        .collect()
}

/// Drain every event currently buffered in `rx`.
pub fn drain(rx: &mut tokio::sync::mpsc::Receiver<ProcessState>) -> Vec<ProcessState> {
    let mut events = Vec::new();
    while let Ok(state) = rx.try_recv() {
        events.push(state);
    }
    events
}
