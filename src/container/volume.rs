//! Shared volume management.
//!
//! Stateful services of an environment mount one volume named after the
//! namespace. Creation and removal are idempotent.

use crate::container::{ContainerError, Engine, ProcessState, ResourceKind, Result, StatusSender};
use std::sync::Arc;
use tracing::{debug, info};

/// Driver used for environment volumes.
pub const VOLUME_DRIVER: &str = "local";

/// Volume manager for persistent storage.
#[derive(Clone)]
pub struct VolumeManager {
    engine: Arc<dyn Engine>,
    status: StatusSender,
}

impl VolumeManager {
    /// Create a new volume manager.
    pub fn new(engine: Arc<dyn Engine>, status: StatusSender) -> Self {
        Self { engine, status }
    }

    /// Make sure a volume called `name` exists.
    ///
    /// # Errors
    ///
    /// Returns error if the volume is absent and cannot be created.
    pub async fn ensure_volume(&self, name: &str) -> Result<()> {
        self.report(name, "checking volume", self.ensure(name)).await
    }

    /// Remove the volume called `name`; a missing volume is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the volume exists and cannot be removed, e.g. because a
    /// container still uses it.
    pub async fn remove_volume(&self, name: &str) -> Result<()> {
        self.report(name, "removing volume", self.remove(name)).await
    }

    async fn report<F>(&self, name: &str, action: &str, operation: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<&'static str>>,
    {
        self.status
            .emit(ProcessState::initiating(ResourceKind::Volume, name, action))
            .await;

        let result = operation.await;
        let state = match &result {
            Ok(detail) => ProcessState::succeeded(ResourceKind::Volume, name, *detail),
            Err(e) => ProcessState::failed(ResourceKind::Volume, name, e),
        };
        self.status.emit(state).await;
        result.map(|_| ())
    }

    async fn ensure(&self, name: &str) -> Result<&'static str> {
        let existing = self
            .engine
            .list_volumes()
            .await
            .map_err(|e| ContainerError::resource("list volumes for", name, e))?;

        if existing.iter().any(|v| v == name) {
            debug!("Volume {} already exists", name);
            return Ok("volume exists");
        }

        match self.engine.create_volume(name, VOLUME_DRIVER).await {
            Ok(()) => {
                info!("Created volume: {}", name);
                Ok("volume created")
            }
            Err(e) if e.is_already_exists() => Ok("volume exists"),
            Err(e) => Err(ContainerError::resource("create volume", name, e)),
        }
    }

    async fn remove(&self, name: &str) -> Result<&'static str> {
        match self.engine.remove_volume(name).await {
            Ok(()) => {
                info!("Removed volume: {}", name);
                Ok("volume removed")
            }
            Err(e) if e.is_not_found() => {
                debug!("Volume {} does not exist", name);
                Ok("volume absent")
            }
            Err(e) => Err(ContainerError::resource("remove volume", name, e)),
        }
    }
}
