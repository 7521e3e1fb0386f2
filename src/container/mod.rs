//! Container orchestration engine.
//!
//! This module drives multi-container environments on Docker/Podman via the
//! bollard API: it materializes service descriptors from configuration, makes
//! sure shared networks and volumes exist, pulls/builds/pushes images, and
//! starts/stops/removes containers concurrently while reporting live status.
//!
//! ## Architecture
//!
//! - [`client`]: Docker/Podman API client, the production [`Engine`]
//! - [`engine`]: the engine seam every other component is written against
//! - [`service`]: immutable service descriptors and their builder
//! - [`registry`]: the built-in services of a World Engine stack
//! - [`network`] / [`volume`]: idempotent shared resource creation
//! - [`image`]: pull, build, and push pipeline
//! - [`context`] / [`build_log`]: build context archives and build output decoding
//! - [`lifecycle`]: concurrent batch start/stop/remove
//! - [`logs`]: log frame demultiplexing and foreground log following
//! - [`status`]: process state events for the display sink
//! - [`orchestrator`]: Build / Start / Stop / Restart / Purge
//!
//! ## Usage
//!
//! ```rust,no_run
//! use world_cli::config::RuntimeConfig;
//! use world_cli::container::{registry, Orchestrator, Role, StatusSender};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RuntimeConfig {
//!         detach: true,
//!         ..Default::default()
//!     };
//!     let services = registry::materialize_all(Role::LOCAL, &config)?;
//!
//!     let orchestrator = Orchestrator::connect(config, StatusSender::disabled()).await?;
//!     orchestrator.start(&services, CancellationToken::new()).await?;
//!     orchestrator.stop(&services).await?;
//!     Ok(())
//! }
//! ```

pub mod build_log;
pub mod client;
pub mod context;
pub mod engine;
pub mod image;
pub mod lifecycle;
pub mod logs;
pub mod network;
pub mod orchestrator;
pub mod registry;
pub mod service;
pub mod status;
pub mod volume;

pub use build_log::{BuildEvent, BuildStepParser};
pub use client::{ContainerClient, ContainerClientConfig, RuntimeType};
pub use context::BuildContext;
pub use engine::{BuildRequest, Engine, ExecOutput, RegistryAuth, TransferProgress};
pub use image::{ImagePipeline, PushTarget};
pub use lifecycle::LifecycleManager;
pub use logs::{LogFrame, LogFrameCodec, StreamKind};
pub use network::NetworkManager;
pub use orchestrator::Orchestrator;
pub use registry::Role;
pub use service::{
    DockerfileSource, HealthCheck, Port, RestartPolicy, ServiceDescriptor, ServiceDescriptorBuilder,
    VolumeMount,
};
pub use status::{Phase, ProcessState, ProgressTracker, ResourceKind, StatusSender};
pub use volume::VolumeManager;

use std::fmt;

/// Container runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Docker/Podman API error
    #[error("Container API error: {0}")]
    ApiError(#[from] bollard::errors::Error),

    /// Resource (container, image, network, volume) not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Invalid service or client configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A network or volume operation failed
    #[error("Failed to {operation} {resource}: {source}")]
    Resource {
        operation: &'static str,
        resource: String,
        #[source]
        source: Box<ContainerError>,
    },

    /// Image pull failed
    #[error("Failed to pull {image}: {reason}")]
    PullFailed { image: String, reason: String },

    /// Image build failed
    #[error("Failed to build {image}: {reason}")]
    BuildFailed { image: String, reason: String },

    /// Image push failed
    #[error("Failed to push {image}: {reason}")]
    PushFailed { image: String, reason: String },

    /// Command execution inside a container failed
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// A log stream could not be decoded
    #[error("Log stream error: {0}")]
    StreamError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The governing context was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Several operations of one batch failed
    #[error("{0}")]
    Aggregate(AggregateError),

    /// General error
    #[error("Container error: {0}")]
    Other(String),
}

impl ContainerError {
    /// Wrap an error with the resource and the operation that failed on it.
    pub fn resource(operation: &'static str, resource: impl Into<String>, source: Self) -> Self {
        Self::Resource {
            operation,
            resource: resource.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error means the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this error means the resource already exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Failures collected from one batch operation, keyed by service or image.
#[derive(Debug)]
pub struct AggregateError {
    failures: Vec<(String, ContainerError)>,
}

impl AggregateError {
    /// Fold per-item results into `Ok(())` or an aggregated error.
    ///
    /// A single failure is still wrapped so callers always see the name of the
    /// item that failed.
    pub fn collect<I>(results: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, Result<()>)>,
    {
        let failures: Vec<_> = results
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|e| (name, e)))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ContainerError::Aggregate(Self { failures }))
        }
    }

    /// Names of the failing items, in batch order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|(name, _)| name.as_str())
    }

    /// Failing items and their errors.
    pub fn failures(&self) -> &[(String, ContainerError)] {
        &self.failures
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} operation(s) failed:", self.failures.len())?;
        for (name, error) in &self.failures {
            write!(f, "\n  - {}: {}", name, error)?;
        }
        Ok(())
    }
}
