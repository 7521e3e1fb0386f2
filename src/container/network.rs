//! Shared network management.
//!
//! Every service of an environment joins one network named after the
//! namespace. Creating it is idempotent: an existing network is left alone,
//! and losing a creation race to another process counts as success.

use crate::container::{ContainerError, Engine, ProcessState, ResourceKind, Result, StatusSender};
use std::sync::Arc;
use tracing::{debug, info};

/// Driver used for environment networks.
pub const NETWORK_DRIVER: &str = "bridge";

/// Network manager for container networking.
#[derive(Clone)]
pub struct NetworkManager {
    engine: Arc<dyn Engine>,
    status: StatusSender,
}

impl NetworkManager {
    /// Create a new network manager.
    pub fn new(engine: Arc<dyn Engine>, status: StatusSender) -> Self {
        Self { engine, status }
    }

    /// Make sure a network called `name` exists.
    ///
    /// # Errors
    ///
    /// Returns error if the network is absent and cannot be created.
    pub async fn ensure_network(&self, name: &str) -> Result<()> {
        self.status
            .emit(ProcessState::initiating(
                ResourceKind::Network,
                name,
                "checking network",
            ))
            .await;

        let result = self.ensure(name).await;
        let state = match &result {
            Ok(detail) => ProcessState::succeeded(ResourceKind::Network, name, *detail),
            Err(e) => ProcessState::failed(ResourceKind::Network, name, e),
        };
        self.status.emit(state).await;
        result.map(|_| ())
    }

    async fn ensure(&self, name: &str) -> Result<&'static str> {
        let existing = self
            .engine
            .list_networks()
            .await
            .map_err(|e| ContainerError::resource("list networks for", name, e))?;

        if existing.iter().any(|n| n == name) {
            debug!("Network {} already exists", name);
            return Ok("network exists");
        }

        match self.engine.create_network(name, NETWORK_DRIVER).await {
            Ok(()) => {
                info!("Created network: {}", name);
                Ok("network created")
            }
            Err(e) if e.is_already_exists() => {
                debug!("Network {} was created concurrently", name);
                Ok("network exists")
            }
            Err(e) => Err(ContainerError::resource("create network", name, e)),
        }
    }
}
