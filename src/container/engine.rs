//! Container engine interface.
//!
//! The orchestration components are written against [`Engine`] rather than the
//! bollard client directly, so batch semantics can be exercised without a
//! daemon. [`crate::container::ContainerClient`] is the Docker/Podman
//! implementation.
//!
//! Conventions every implementation follows:
//! - a missing resource is reported as [`ContainerError::NotFound`]
//! - a create that collides with an existing resource is reported as
//!   [`ContainerError::AlreadyExists`]
//! - stopping an already stopped container succeeds
//!
//! [`ContainerError::NotFound`]: crate::container::ContainerError::NotFound
//! [`ContainerError::AlreadyExists`]: crate::container::ContainerError::AlreadyExists

use crate::container::{BuildEvent, LogFrame, Result, ServiceDescriptor};
use async_trait::async_trait;
use std::time::Duration;

/// One progress message of an image pull or push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferProgress {
    /// Layer or image id the message refers to
    pub id: Option<String>,
    /// Status text, e.g. `Downloading`
    pub status: Option<String>,
    /// Bytes transferred so far
    pub current: Option<i64>,
    /// Total bytes
    pub total: Option<i64>,
}

/// Credentials for pushing to a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    /// Registry host, e.g. `us-docker.pkg.dev`
    pub server_address: String,
    /// Bearer token for the registry
    pub token: String,
}

/// Image build request.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Tag of the resulting image
    pub tag: String,
    /// Build stage to stop at
    pub target: String,
    /// Platform to build for
    pub platform: Option<String>,
    /// Build context tar archive
    pub context: Vec<u8>,
    /// Request the BuildKit builder instead of the legacy one
    pub buildkit: bool,
}

/// Output from command execution.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code (None if not available)
    pub exit_code: Option<i64>,
}

impl ExecOutput {
    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Container engine operations used by the orchestrator.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Whether builds use the BuildKit protocol.
    fn buildkit_supported(&self) -> bool;

    /// Check if a container with this name exists.
    async fn container_exists(&self, name: &str) -> Result<bool>;

    /// Check if a container with this name is running.
    async fn container_running(&self, name: &str) -> Result<bool>;

    /// Create a container named after the service from its descriptor.
    async fn create_container(&self, service: &ServiceDescriptor) -> Result<()>;

    /// Start an existing container.
    async fn start_container(&self, name: &str) -> Result<()>;

    /// Stop a container with SIGINT, killing it after `grace`.
    async fn stop_container(&self, name: &str, grace: Duration) -> Result<()>;

    /// Remove a stopped container.
    async fn remove_container(&self, name: &str) -> Result<()>;

    /// Run a command in a running container and collect its output.
    async fn exec(&self, name: &str, cmd: &[String]) -> Result<ExecOutput>;

    /// Follow a container's stdout and stderr until the stream ends.
    ///
    /// `since` is a unix timestamp; `None` replays the whole log.
    async fn stream_logs(
        &self,
        name: &str,
        since: Option<i64>,
        on_frame: &mut (dyn FnMut(LogFrame) + Send),
    ) -> Result<()>;

    /// Check if an image exists locally.
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Pull an image, reporting progress.
    async fn pull_image(
        &self,
        image: &str,
        on_progress: &mut (dyn FnMut(TransferProgress) + Send),
    ) -> Result<()>;

    /// Build an image, passing every decoded build event to `on_event`.
    ///
    /// An error returned by `on_event` aborts the build and is returned.
    async fn build_image(
        &self,
        request: BuildRequest,
        on_event: &mut (dyn FnMut(BuildEvent) -> Result<()> + Send),
    ) -> Result<()>;

    /// Tag `image` as `target` (`repo[:tag]`).
    async fn tag_image(&self, image: &str, target: &str) -> Result<()>;

    /// Push an image, reporting progress.
    async fn push_image(
        &self,
        image: &str,
        auth: Option<&RegistryAuth>,
        on_progress: &mut (dyn FnMut(TransferProgress) + Send),
    ) -> Result<()>;

    /// Names of all networks.
    async fn list_networks(&self) -> Result<Vec<String>>;

    /// Create a network.
    async fn create_network(&self, name: &str, driver: &str) -> Result<()>;

    /// Names of all volumes.
    async fn list_volumes(&self) -> Result<Vec<String>>;

    /// Create a volume.
    async fn create_volume(&self, name: &str, driver: &str) -> Result<()>;

    /// Remove a volume.
    async fn remove_volume(&self, name: &str) -> Result<()>;
}
