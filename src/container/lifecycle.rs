//! Concurrent container lifecycle operations.
//!
//! Every batch runs one task per service. Each task reports an initiating
//! event and exactly one terminal event to the display sink; the batch waits
//! for all tasks and succeeds only if none failed. There are no retries.

use crate::container::{
    AggregateError, Engine, ProcessState, ResourceKind, Result, ServiceDescriptor, StatusSender,
};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Operation applied to every service of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Start,
    Stop,
    Remove,
}

impl Action {
    fn verb(self) -> &'static str {
        match self {
            Action::Start => "starting",
            Action::Stop => "stopping",
            Action::Remove => "removing",
        }
    }
}

/// Starts, stops, and removes the containers of a set of services.
#[derive(Clone)]
pub struct LifecycleManager {
    engine: Arc<dyn Engine>,
    status: StatusSender,
    stop_timeout: Duration,
}

impl LifecycleManager {
    /// Create a manager; `stop_timeout` is the grace period between SIGINT and
    /// a forced kill.
    pub fn new(engine: Arc<dyn Engine>, status: StatusSender, stop_timeout: Duration) -> Self {
        Self {
            engine,
            status,
            stop_timeout,
        }
    }

    /// Create any missing containers and start all of them.
    ///
    /// # Errors
    ///
    /// Returns an aggregated error naming every service that failed to start.
    pub async fn start_all(&self, services: &[ServiceDescriptor]) -> Result<()> {
        self.process_multiple(services, Action::Start).await
    }

    /// Gracefully stop all containers; containers that do not exist are skipped.
    ///
    /// # Errors
    ///
    /// Returns an aggregated error naming every service that failed to stop.
    pub async fn stop_all(&self, services: &[ServiceDescriptor]) -> Result<()> {
        self.process_multiple(services, Action::Stop).await
    }

    /// Stop running containers and remove all of them.
    ///
    /// # Errors
    ///
    /// Returns an aggregated error naming every service that failed.
    pub async fn remove_all(&self, services: &[ServiceDescriptor]) -> Result<()> {
        self.process_multiple(services, Action::Remove).await
    }

    async fn process_multiple(&self, services: &[ServiceDescriptor], action: Action) -> Result<()> {
        debug!("{} {} container(s)", action.verb(), services.len());

        let tasks = services.iter().map(|service| async move {
            let name = service.name.as_str();
            self.status
                .emit(ProcessState::initiating(
                    ResourceKind::Container,
                    name,
                    action.verb(),
                ))
                .await;

            let result = match action {
                Action::Start => self.start(service).await,
                Action::Stop => self.stop(name).await,
                Action::Remove => self.remove(name).await,
            };

            let state = match &result {
                Ok(detail) => ProcessState::succeeded(ResourceKind::Container, name, *detail),
                Err(e) => ProcessState::failed(ResourceKind::Container, name, e),
            };
            self.status.emit(state).await;

            (service.name.clone(), result.map(|_| ()))
        });

        AggregateError::collect(join_all(tasks).await)
    }

    async fn start(&self, service: &ServiceDescriptor) -> Result<&'static str> {
        let name = service.name.as_str();

        if !self.engine.container_exists(name).await? {
            match self.engine.create_container(service).await {
                Ok(()) => debug!("Created container {}", name),
                Err(e) if e.is_already_exists() => debug!("Container {} already exists", name),
                Err(e) => return Err(e),
            }
        }

        self.engine.start_container(name).await?;
        info!("Container {} started", name);
        Ok("started")
    }

    async fn stop(&self, name: &str) -> Result<&'static str> {
        match self.engine.stop_container(name, self.stop_timeout).await {
            Ok(()) => {
                info!("Container {} stopped", name);
                Ok("stopped")
            }
            Err(e) if e.is_not_found() => {
                debug!("Container {} does not exist, nothing to stop", name);
                Ok("not found")
            }
            Err(e) => Err(e),
        }
    }

    async fn remove(&self, name: &str) -> Result<&'static str> {
        if self.engine.container_running(name).await? {
            self.stop(name).await?;
        }

        match self.engine.remove_container(name).await {
            Ok(()) => {
                info!("Container {} removed", name);
                Ok("removed")
            }
            Err(e) if e.is_not_found() => {
                debug!("Container {} does not exist, nothing to remove", name);
                Ok("not found")
            }
            Err(e) => Err(e),
        }
    }
}
