//! Orchestration facade.
//!
//! Composes the resource, image, and lifecycle layers into the user-facing
//! operations: Build, Start, Stop, Restart, Purge, and starting the EVM
//! settlement shard. Steps of one operation run strictly in sequence; the
//! work inside each step is concurrent.

use crate::config::RuntimeConfig;
use crate::container::{
    BuildContext, ContainerClient, ContainerClientConfig, ContainerError, Engine, ImagePipeline,
    LifecycleManager, NetworkManager, PushTarget, Result, Role, ServiceDescriptor, StatusSender,
    VolumeManager, logs, registry,
};
use crate::env::{self, keys};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives tagged container log lines during foreground runs.
pub type LineSink = Arc<dyn Fn(String) + Send + Sync>;

/// Interval between DA auth token attempts.
const TOKEN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// High-level environment orchestrator.
pub struct Orchestrator {
    config: RuntimeConfig,
    engine: Arc<dyn Engine>,
    networks: NetworkManager,
    volumes: VolumeManager,
    images: ImagePipeline,
    lifecycle: LifecycleManager,
    log_sink: LineSink,
}

impl Orchestrator {
    /// Connect to the local container runtime.
    ///
    /// # Errors
    ///
    /// Returns error if connection to container runtime fails.
    pub async fn connect(config: RuntimeConfig, status: StatusSender) -> Result<Self> {
        Self::connect_with(config, ContainerClientConfig::default(), status).await
    }

    /// Connect to the local container runtime with custom client settings.
    ///
    /// # Errors
    ///
    /// Returns error if connection to container runtime fails.
    pub async fn connect_with(
        config: RuntimeConfig,
        client_config: ContainerClientConfig,
        status: StatusSender,
    ) -> Result<Self> {
        let client = ContainerClient::with_config(client_config).await?;
        Ok(Self::with_engine(config, Arc::new(client), status))
    }

    /// Create an orchestrator over an existing engine.
    pub fn with_engine(config: RuntimeConfig, engine: Arc<dyn Engine>, status: StatusSender) -> Self {
        let stop_timeout = Duration::from_secs(config.timeout_seconds);
        Self {
            networks: NetworkManager::new(engine.clone(), status.clone()),
            volumes: VolumeManager::new(engine.clone(), status.clone()),
            images: ImagePipeline::new(engine.clone(), status.clone()),
            lifecycle: LifecycleManager::new(engine.clone(), status, stop_timeout),
            log_sink: Arc::new(|line: String| println!("{}", line)),
            config,
            engine,
        }
    }

    /// Send foreground log lines to `sink` instead of stdout.
    pub fn with_log_sink(mut self, sink: LineSink) -> Self {
        self.log_sink = sink;
        self
    }

    /// Runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn build_context(&self) -> BuildContext {
        BuildContext::new(&self.config.root_dir)
    }

    /// Build every locally built image of `services`, then push them when a
    /// target is given.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error; batch steps aggregate failures.
    pub async fn build(
        &self,
        services: &[ServiceDescriptor],
        push: Option<&PushTarget>,
    ) -> Result<()> {
        let namespace = self.config.namespace();
        self.volumes.ensure_volume(&namespace).await?;
        self.images.pull_missing(services).await?;
        self.images.build_all(services, &self.build_context()).await?;

        if let Some(target) = push {
            self.images.push(target, services).await?;
        }
        Ok(())
    }

    /// Start `services`.
    ///
    /// Unless the configuration is detached, this then follows every
    /// container's logs until `cancel` fires and stops all containers on the
    /// way out, whatever the outcome. Cancellation is not an error.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error; batch steps aggregate failures.
    pub async fn start(&self, services: &[ServiceDescriptor], cancel: CancellationToken) -> Result<()> {
        ignore_cancelled(self.start_inner(services, &cancel).await)
    }

    async fn start_inner(
        &self,
        services: &[ServiceDescriptor],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let namespace = self.config.namespace();
        cancellable(cancel, self.networks.ensure_network(&namespace)).await?;
        cancellable(cancel, self.volumes.ensure_volume(&namespace)).await?;
        cancellable(cancel, self.images.pull_missing(services)).await?;

        if self.config.build {
            let context = self.build_context();
            cancellable(cancel, self.images.build_all(services, &context)).await?;
        }

        self.launch(services, cancel).await
    }

    async fn launch(&self, services: &[ServiceDescriptor], cancel: &CancellationToken) -> Result<()> {
        if self.config.detach {
            return cancellable(cancel, self.lifecycle.start_all(services)).await;
        }

        let guard = ForegroundGuard::arm(self.lifecycle.clone(), services);
        let result = self.run_foreground(services, cancel).await;
        let cleanup = guard.release().await;

        match (result, cleanup) {
            (Err(e), Err(cleanup)) => {
                warn!("Cleanup after failed start also failed: {}", cleanup);
                Err(e)
            }
            (result, cleanup) => result.and(cleanup),
        }
    }

    async fn run_foreground(
        &self,
        services: &[ServiceDescriptor],
        cancel: &CancellationToken,
    ) -> Result<()> {
        cancellable(cancel, self.lifecycle.start_all(services)).await?;

        info!("Following logs of {} container(s)", services.len());
        logs::follow_all(
            self.engine.as_ref(),
            services,
            cancel,
            self.log_sink.as_ref(),
        )
        .await;
        Ok(())
    }

    /// Gracefully stop `services`.
    ///
    /// # Errors
    ///
    /// Returns an aggregated error naming every service that failed to stop.
    pub async fn stop(&self, services: &[ServiceDescriptor]) -> Result<()> {
        self.lifecycle.stop_all(services).await
    }

    /// Stop every service, then start them again.
    ///
    /// # Errors
    ///
    /// Returns the stop error, or the start error.
    pub async fn restart(
        &self,
        services: &[ServiceDescriptor],
        cancel: CancellationToken,
    ) -> Result<()> {
        self.stop(services).await?;
        self.start(services, cancel).await
    }

    /// Remove every container of `services`, then the shared volume.
    ///
    /// # Errors
    ///
    /// Returns an aggregated removal error, or the volume removal error.
    pub async fn purge(&self, services: &[ServiceDescriptor]) -> Result<()> {
        self.lifecycle.remove_all(services).await?;
        self.volumes.remove_volume(&self.config.namespace()).await
    }

    /// Start the EVM settlement shard.
    ///
    /// The Celestia devnet is started detached first; once it hands out a DA
    /// auth token, the EVM node is started with that token. A foreground run
    /// then follows both containers.
    ///
    /// # Errors
    ///
    /// Returns error if a step fails or no token is issued within
    /// `timeout_seconds`.
    pub async fn start_settlement_shard(&self, cancel: CancellationToken) -> Result<()> {
        ignore_cancelled(self.start_settlement_shard_inner(&cancel).await)
    }

    async fn start_settlement_shard_inner(&self, cancel: &CancellationToken) -> Result<()> {
        let namespace = self.config.namespace();
        let celestia = registry::materialize(Role::CelestiaDevnet, &self.config)?;

        cancellable(cancel, self.networks.ensure_network(&namespace)).await?;
        let devnet = std::slice::from_ref(&celestia);
        cancellable(cancel, self.images.pull_missing(devnet)).await?;
        cancellable(cancel, self.lifecycle.start_all(devnet)).await?;

        let token = self.da_auth_token(&celestia.name, cancel).await?;
        let mut config = self.config.clone();
        config.env.insert(keys::DA_AUTH_TOKEN.to_string(), token);

        let evm = registry::materialize(Role::Evm, &config)?;
        cancellable(cancel, self.images.pull_missing(std::slice::from_ref(&evm))).await?;

        if self.config.detach {
            return cancellable(cancel, self.lifecycle.start_all(std::slice::from_ref(&evm))).await;
        }
        self.launch(&[celestia, evm], cancel).await
    }

    /// Fetch the DA admin token from a running Celestia devnet container,
    /// retrying every second until `timeout_seconds` elapse.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::ExecutionError`] on timeout, or
    /// [`ContainerError::Cancelled`] if `cancel` fires first.
    pub async fn da_auth_token(&self, container: &str, cancel: &CancellationToken) -> Result<String> {
        let cmd: Vec<String> = [
            "celestia",
            "bridge",
            "auth",
            "admin",
            "--node.store",
            env::celestia::BRIDGE_STORE,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let deadline = Instant::now() + timeout;

        loop {
            match self.engine.exec(container, &cmd).await {
                Ok(output) if output.success() => {
                    if let Some(token) = output
                        .stdout
                        .lines()
                        .map(str::trim)
                        .rfind(|line| !line.is_empty())
                    {
                        info!("Retrieved DA auth token from {}", container);
                        return Ok(token.to_string());
                    }
                    debug!("{} returned an empty DA auth token", container);
                }
                Ok(output) => debug!(
                    "DA auth token not ready (exit {:?}): {}",
                    output.exit_code,
                    output.stderr.trim()
                ),
                Err(e) => debug!("DA auth token not ready: {}", e),
            }

            if Instant::now() >= deadline {
                return Err(ContainerError::ExecutionError(format!(
                    "Timed out after {}s waiting for a DA auth token from {}",
                    timeout.as_secs(),
                    container
                )));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ContainerError::Cancelled),
                _ = tokio::time::sleep(TOKEN_POLL_INTERVAL) => {}
            }
        }
    }
}

/// Run `operation` unless `cancel` fires first.
async fn cancellable<T, F>(cancel: &CancellationToken, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ContainerError::Cancelled),
        result = operation => result,
    }
}

fn ignore_cancelled(result: Result<()>) -> Result<()> {
    match result {
        Err(ContainerError::Cancelled) => {
            info!("Operation cancelled");
            Ok(())
        }
        result => result,
    }
}

/// Stops every container of a foreground run when the run ends.
///
/// [`ForegroundGuard::release`] performs the stop in place. If the guard is
/// dropped without being released (the start future itself was dropped), the
/// stop is spawned onto the current runtime instead.
struct ForegroundGuard {
    lifecycle: LifecycleManager,
    services: Vec<ServiceDescriptor>,
    armed: bool,
}

impl ForegroundGuard {
    fn arm(lifecycle: LifecycleManager, services: &[ServiceDescriptor]) -> Self {
        Self {
            lifecycle,
            services: services.to_vec(),
            armed: true,
        }
    }

    async fn release(mut self) -> Result<()> {
        self.armed = false;
        info!("Stopping {} container(s)", self.services.len());
        self.lifecycle.stop_all(&self.services).await
    }
}

impl Drop for ForegroundGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available to stop foreground containers");
            return;
        };
        let lifecycle = self.lifecycle.clone();
        let services = std::mem::take(&mut self.services);
        handle.spawn(async move {
            if let Err(e) = lifecycle.stop_all(&services).await {
                warn!("Failed to stop foreground containers: {}", e);
            }
        });
    }
}
