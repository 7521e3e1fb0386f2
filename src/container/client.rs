//! Docker/Podman client wrapper.
//!
//! Provides the bollard-backed [`Engine`] with automatic connection handling,
//! a Podman fallback, and BuildKit detection resolved once at connect time.

use crate::container::{
    BuildEvent, BuildRequest, ContainerError, Engine, ExecOutput, LogFrame, RegistryAuth, Result,
    ServiceDescriptor, TransferProgress,
};
use crate::container::service::RestartPolicy;
use crate::env;
use async_trait::async_trait;
use bollard::Docker;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::service::{
    HealthConfig, HostConfig, Mount, MountTypeEnum, PortBinding, RestartPolicyNameEnum,
};
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Minimum engine API version with BuildKit support.
const BUILDKIT_MIN_API: (u32, u32) = (1, 39);

/// Container client configuration.
#[derive(Debug, Clone)]
pub struct ContainerClientConfig {
    /// Connection timeout in seconds
    pub timeout: u64,
    /// Force BuildKit on or off; `None` reads `DOCKER_BUILDKIT`, then probes
    /// the engine API version
    pub buildkit: Option<bool>,
}

impl Default for ContainerClientConfig {
    fn default() -> Self {
        Self {
            timeout: 120,
            buildkit: None,
        }
    }
}

/// Docker/Podman API client wrapper.
///
/// Manages connection to Docker or Podman daemon with automatic fallback
/// and health checking.
#[derive(Clone)]
pub struct ContainerClient {
    docker: Arc<Docker>,
    buildkit: bool,
}

impl ContainerClient {
    /// Create a new container client with default configuration.
    ///
    /// Attempts to connect to Docker first, then falls back to Podman if available.
    ///
    /// # Errors
    ///
    /// Returns error if neither Docker nor Podman are available or connection fails.
    pub async fn new() -> Result<Self> {
        Self::with_config(ContainerClientConfig::default()).await
    }

    /// Create a new container client with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns error if connection to container runtime fails.
    pub async fn with_config(config: ContainerClientConfig) -> Result<Self> {
        let docker = Self::connect(config.timeout).await?;

        let mut client = Self {
            docker: Arc::new(docker),
            buildkit: false,
        };

        // Verify connection works
        client.ping().await?;

        let requested = match config.buildkit {
            Some(forced) => Some(forced),
            None => std::env::var("DOCKER_BUILDKIT")
                .ok()
                .and_then(|v| parse_flag(&v)),
        };
        let api_version = client.version().await.ok().and_then(|v| v.api_version);
        client.buildkit = resolve_buildkit(requested, api_version.as_deref());
        debug!("BuildKit enabled: {}", client.buildkit);

        Ok(client)
    }

    /// Connect to Docker or Podman daemon.
    ///
    /// Tries multiple connection strategies in order:
    /// 1. Local defaults (Unix socket or Windows named pipe, honouring DOCKER_HOST)
    /// 2. Rootless Podman socket
    /// 3. System Podman socket
    async fn connect(timeout: u64) -> Result<Docker> {
        debug!("Attempting to connect to container runtime...");

        match Docker::connect_with_local_defaults() {
            Ok(docker) => {
                info!("Connected to container runtime via local defaults");
                return Ok(docker.with_timeout(Duration::from_secs(timeout)));
            }
            Err(e) => {
                debug!("Local defaults failed: {}", e);
            }
        }

        #[cfg(unix)]
        {
            let mut sockets = Vec::new();
            if let Ok(home) = std::env::var("HOME") {
                sockets.push(format!("unix://{}/run/podman/podman.sock", home));
            }
            sockets.push("unix:///run/podman/podman.sock".to_string());

            for socket in sockets {
                debug!("Trying Podman socket: {}", socket);
                match Docker::connect_with_socket(&socket, timeout, bollard::API_DEFAULT_VERSION) {
                    Ok(docker) => {
                        info!("Connected to Podman via {}", socket);
                        return Ok(docker);
                    }
                    Err(e) => {
                        debug!("Podman socket {} failed: {}", socket, e);
                    }
                }
            }
        }

        Err(ContainerError::Other(
            "Failed to connect to Docker or Podman. Please ensure Docker or Podman is installed and running.".to_string()
        ))
    }

    /// Ping the container runtime to verify connectivity.
    ///
    /// # Errors
    ///
    /// Returns error if ping fails.
    pub async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map_err(|e| {
            ContainerError::Other(format!("Failed to ping container runtime: {}", e))
        })?;
        debug!("Container runtime ping successful");
        Ok(())
    }

    /// Get version information from the container runtime.
    ///
    /// # Errors
    ///
    /// Returns error if version query fails.
    pub async fn version(&self) -> Result<bollard::models::SystemVersion> {
        self.docker
            .version()
            .await
            .map_err(|e| ContainerError::Other(format!("Failed to get version: {}", e)))
    }

    /// Get the underlying Docker client.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Check if the runtime is Docker or Podman.
    ///
    /// # Errors
    ///
    /// Returns error if runtime detection fails.
    pub async fn runtime_type(&self) -> Result<RuntimeType> {
        let version = self.version().await?;

        let podman = version
            .components
            .unwrap_or_default()
            .iter()
            .any(|c| c.name.to_lowercase().contains("podman"));

        if podman {
            Ok(RuntimeType::Podman)
        } else {
            Ok(RuntimeType::Docker)
        }
    }
}

#[async_trait]
impl Engine for ContainerClient {
    fn buildkit_supported(&self) -> bool {
        self.buildkit
    }

    async fn container_exists(&self, name: &str) -> Result<bool> {
        match self
            .docker
            .inspect_container(
                name,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(ContainerError::ApiError(e)),
        }
    }

    async fn container_running(&self, name: &str) -> Result<bool> {
        let inspect = match self
            .docker
            .inspect_container(
                name,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
        {
            Ok(inspect) => inspect,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Ok(false),
            Err(e) => return Err(ContainerError::ApiError(e)),
        };

        Ok(inspect
            .state
            .and_then(|state| state.running)
            .unwrap_or(false))
    }

    async fn create_container(&self, service: &ServiceDescriptor) -> Result<()> {
        debug!("Creating container: {}", service.name);

        let options = bollard::container::CreateContainerOptions {
            name: service.name.clone(),
            platform: service.platform.clone(),
        };

        let response = self
            .docker
            .create_container(Some(options), container_config(service))
            .await
            .map_err(|e| on_create_error(e, service))?;

        for warning in response.warnings {
            warn!("Creating {}: {}", service.name, warning);
        }
        info!("Created container: {} ({})", service.name, response.id);
        Ok(())
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        debug!("Starting container: {}", name);

        match self
            .docker
            .start_container(name, None::<bollard::container::StartContainerOptions<String>>)
            .await
        {
            Ok(()) => {}
            // Already running
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {}
            Err(e) => return Err(on_missing(e, name)),
        }

        info!("Started container: {}", name);
        Ok(())
    }

    async fn stop_container(&self, name: &str, grace: Duration) -> Result<()> {
        debug!("Stopping container: {}", name);

        let options = bollard::query_parameters::StopContainerOptions {
            t: Some(i32::try_from(grace.as_secs()).unwrap_or(i32::MAX)),
            signal: Some("SIGINT".to_string()),
        };

        match self.docker.stop_container(name, Some(options)).await {
            Ok(()) => {}
            // Already stopped
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {}
            Err(e) => return Err(on_missing(e, name)),
        }

        info!("Stopped container: {}", name);
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        debug!("Removing container: {}", name);

        self.docker
            .remove_container(
                name,
                Some(bollard::container::RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| on_missing(e, name))?;

        info!("Removed container: {}", name);
        Ok(())
    }

    async fn exec(&self, name: &str, cmd: &[String]) -> Result<ExecOutput> {
        debug!("Executing command in container {}: {:?}", name, cmd);

        let exec_options = CreateExecOptions {
            cmd: Some(cmd.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(name, exec_options)
            .await
            .map_err(|e| on_missing(e, name))?;

        let start_results = self.docker.start_exec(&exec.id, None).await?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        match start_results {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(result) = output.next().await {
                    match result {
                        Ok(log) => {
                            let text = log.to_string();
                            match log {
                                bollard::container::LogOutput::StdOut { .. } => {
                                    stdout.push_str(&text);
                                }
                                bollard::container::LogOutput::StdErr { .. } => {
                                    stderr.push_str(&text);
                                }
                                _ => {}
                            }
                        }
                        Err(e) => {
                            return Err(ContainerError::ExecutionError(format!(
                                "Failed to read output: {}",
                                e
                            )));
                        }
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(ContainerError::ExecutionError(
                    "Unexpected detached execution".to_string(),
                ));
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        let exit_code = inspect.exit_code;

        debug!("Command executed with exit code: {:?}", exit_code);

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    async fn stream_logs(
        &self,
        name: &str,
        since: Option<i64>,
        on_frame: &mut (dyn FnMut(LogFrame) + Send),
    ) -> Result<()> {
        let mut stream = self.docker.logs(
            name,
            Some(bollard::container::LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                since: since.unwrap_or(0),
                ..Default::default()
            }),
        );

        while let Some(result) = stream.next().await {
            match result {
                Ok(output) => on_frame(LogFrame::from(output)),
                Err(e) => return Err(ContainerError::StreamError(format!("{}: {}", name, e))),
            }
        }

        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(ContainerError::ApiError(e)),
        }
    }

    async fn pull_image(
        &self,
        image: &str,
        on_progress: &mut (dyn FnMut(TransferProgress) + Send),
    ) -> Result<()> {
        let mut stream = self.docker.create_image(
            Some(bollard::image::CreateImageOptions {
                from_image: image,
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(reason) = info.error_detail.and_then(|d| d.message) {
                        return Err(ContainerError::PullFailed {
                            image: image.to_string(),
                            reason,
                        });
                    }
                    let detail = info.progress_detail.unwrap_or_default();
                    on_progress(TransferProgress {
                        id: info.id,
                        status: info.status,
                        current: detail.current,
                        total: detail.total,
                    });
                }
                Err(e) => {
                    return Err(ContainerError::PullFailed {
                        image: image.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!("Successfully pulled image: {}", image);
        Ok(())
    }

    async fn build_image(
        &self,
        request: BuildRequest,
        on_event: &mut (dyn FnMut(BuildEvent) -> Result<()> + Send),
    ) -> Result<()> {
        let options = bollard::image::BuildImageOptions {
            dockerfile: env::build::DOCKERFILE_NAME.to_string(),
            t: request.tag.clone(),
            target: request.target.clone(),
            platform: request.platform.clone().unwrap_or_default(),
            rm: true,
            #[cfg(feature = "buildkit")]
            version: if request.buildkit {
                bollard::image::BuilderVersion::BuilderBuildKit
            } else {
                bollard::image::BuilderVersion::BuilderV1
            },
            #[cfg(feature = "buildkit")]
            session: request
                .buildkit
                .then(|| uuid::Uuid::new_v4().to_string()),
            ..Default::default()
        };

        debug!(
            "Building {} (target {}, buildkit {})",
            request.tag, request.target, request.buildkit
        );

        let mut stream = self.docker.build_image(
            options,
            None,
            Some(bollard::body_full(request.context.into())),
        );

        while let Some(result) = stream.next().await {
            let event = match result {
                Ok(info) => BuildEvent::from(info),
                Err(bollard::errors::Error::DockerStreamError { error }) => {
                    BuildEvent::Error(error)
                }
                Err(e) => return Err(ContainerError::ApiError(e)),
            };

            let failure = match &event {
                BuildEvent::Error(message) => Some(message.clone()),
                _ => None,
            };
            on_event(event)?;
            if let Some(reason) = failure {
                return Err(ContainerError::BuildFailed {
                    image: request.tag,
                    reason,
                });
            }
        }

        info!("Successfully built image: {}", request.tag);
        Ok(())
    }

    async fn tag_image(&self, image: &str, target: &str) -> Result<()> {
        let (repo, tag) = split_reference(target);
        self.docker
            .tag_image(
                image,
                Some(bollard::image::TagImageOptions {
                    repo: repo.to_string(),
                    tag: tag.to_string(),
                }),
            )
            .await
            .map_err(|e| on_missing(e, image))?;

        debug!("Tagged {} as {}", image, target);
        Ok(())
    }

    async fn push_image(
        &self,
        image: &str,
        auth: Option<&RegistryAuth>,
        on_progress: &mut (dyn FnMut(TransferProgress) + Send),
    ) -> Result<()> {
        let (repo, tag) = split_reference(image);
        let credentials = auth.map(|auth| bollard::auth::DockerCredentials {
            serveraddress: Some(auth.server_address.clone()),
            registrytoken: Some(auth.token.clone()),
            ..Default::default()
        });

        let mut stream = self.docker.push_image(
            repo,
            Some(bollard::image::PushImageOptions {
                tag: tag.to_string(),
            }),
            credentials,
        );

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    let detail = info.progress_detail.unwrap_or_default();
                    on_progress(TransferProgress {
                        id: None,
                        status: info.status,
                        current: detail.current,
                        total: detail.total,
                    });
                }
                Err(e) => {
                    return Err(ContainerError::PushFailed {
                        image: image.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!("Successfully pushed image: {}", image);
        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<String>> {
        let networks = self
            .docker
            .list_networks(None::<bollard::network::ListNetworksOptions<String>>)
            .await?;

        Ok(networks.into_iter().filter_map(|n| n.name).collect())
    }

    async fn create_network(&self, name: &str, driver: &str) -> Result<()> {
        let response = self
            .docker
            .create_network(bollard::network::CreateNetworkOptions {
                name,
                driver,
                ..Default::default()
            })
            .await
            .map_err(|e| on_conflict(e, name))?;

        info!("Created network: {} ({})", name, response.id);
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<String>> {
        let response = self
            .docker
            .list_volumes(None::<bollard::volume::ListVolumesOptions<String>>)
            .await?;

        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| v.name)
            .collect())
    }

    async fn create_volume(&self, name: &str, driver: &str) -> Result<()> {
        let response = self
            .docker
            .create_volume(bollard::volume::CreateVolumeOptions {
                name,
                driver,
                driver_opts: HashMap::new(),
                labels: HashMap::new(),
            })
            .await
            .map_err(|e| on_conflict(e, name))?;

        info!("Created volume: {}", response.name);
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.docker
            .remove_volume(name, Some(bollard::volume::RemoveVolumeOptions { force: false }))
            .await
            .map_err(|e| on_missing(e, name))?;

        info!("Removed volume: {}", name);
        Ok(())
    }
}

fn on_missing(e: bollard::errors::Error, name: &str) -> ContainerError {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => ContainerError::NotFound(name.to_string()),
        e => ContainerError::ApiError(e),
    }
}

fn on_conflict(e: bollard::errors::Error, name: &str) -> ContainerError {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 409, ..
        } => ContainerError::AlreadyExists(name.to_string()),
        e => on_missing(e, name),
    }
}

/// On create, a 404 means the image is missing, not the container.
fn on_create_error(e: bollard::errors::Error, service: &ServiceDescriptor) -> ContainerError {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => ContainerError::ConfigError(format!(
            "Image {} for {} not found locally; run with --build to build it",
            service.image, service.name
        )),
        e => on_conflict(e, &service.name),
    }
}

/// Container configuration for a service descriptor.
fn container_config(service: &ServiceDescriptor) -> bollard::container::Config<String> {
    let exposed_ports: HashMap<String, HashMap<(), ()>> = service
        .exposed_ports
        .iter()
        .map(|port| (port.tcp_key(), HashMap::new()))
        .collect();

    let env = service.env_list();

    bollard::container::Config {
        image: Some(service.image.clone()),
        hostname: Some(service.name.clone()),
        cmd: service.cmd.clone(),
        entrypoint: service.entrypoint.clone(),
        env: if env.is_empty() { None } else { Some(env) },
        exposed_ports: if exposed_ports.is_empty() {
            None
        } else {
            Some(exposed_ports)
        },
        healthcheck: service.health_check.as_ref().map(|hc| HealthConfig {
            test: Some(hc.test.clone()),
            interval: Some(nanos(hc.interval)),
            timeout: Some(nanos(hc.timeout)),
            retries: Some(i64::from(hc.retries)),
            ..Default::default()
        }),
        host_config: Some(host_config(service)),
        ..Default::default()
    }
}

/// Host configuration for a service descriptor.
fn host_config(service: &ServiceDescriptor) -> HostConfig {
    let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = service
        .port_bindings
        .iter()
        .map(|(container_port, host_port)| {
            (
                container_port.tcp_key(),
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(host_port.to_string()),
                }]),
            )
        })
        .collect();

    let mounts = service.volume.as_ref().map(|volume| {
        vec![Mount {
            target: Some(volume.target.clone()),
            source: Some(volume.source.clone()),
            typ: Some(MountTypeEnum::VOLUME),
            ..Default::default()
        }]
    });

    let restart_policy = match service.restart_policy {
        RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
        RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
        RestartPolicy::No => RestartPolicyNameEnum::NO,
    };

    HostConfig {
        port_bindings: if port_bindings.is_empty() {
            None
        } else {
            Some(port_bindings)
        },
        mounts,
        network_mode: Some(service.network.clone()),
        restart_policy: Some(bollard::service::RestartPolicy {
            name: Some(restart_policy),
            maximum_retry_count: None,
        }),
        cap_add: if service.cap_add.is_empty() {
            None
        } else {
            Some(service.cap_add.clone())
        },
        security_opt: if service.security_opt.is_empty() {
            None
        } else {
            Some(service.security_opt.clone())
        },
        ..Default::default()
    }
}

fn nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

/// Split `repo[:tag]` into repository and tag, defaulting the tag to `latest`.
///
/// A colon inside the registry host (`localhost:5000/game`) is not a tag.
pub fn split_reference(reference: &str) -> (&str, &str) {
    let name_start = reference.rfind('/').map_or(0, |i| i + 1);
    match reference[name_start..].rfind(':') {
        Some(i) => (
            &reference[..name_start + i],
            &reference[name_start + i + 1..],
        ),
        None => (reference, "latest"),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn api_at_least(version: &str, minimum: (u32, u32)) -> bool {
    let mut parts = version.trim().split('.');
    let major = parts.next().and_then(|p| p.parse::<u32>().ok());
    let minor = parts.next().and_then(|p| p.parse::<u32>().ok());
    match (major, minor) {
        (Some(major), Some(minor)) => (major, minor) >= minimum,
        _ => false,
    }
}

/// Decide whether builds use BuildKit.
///
/// An explicit request wins over the engine API version probe; either way the
/// crate must be compiled with the `buildkit` feature.
pub fn resolve_buildkit(requested: Option<bool>, api_version: Option<&str>) -> bool {
    let wanted = requested
        .unwrap_or_else(|| api_version.is_some_and(|v| api_at_least(v, BUILDKIT_MIN_API)));

    if wanted && !cfg!(feature = "buildkit") {
        debug!("BuildKit requested but not compiled in, using the legacy builder");
        return false;
    }
    wanted
}

/// Type of container runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeType {
    /// Docker runtime
    Docker,
    /// Podman runtime
    Podman,
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeType::Docker => write!(f, "Docker"),
            RuntimeType::Podman => write!(f, "Podman"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ServiceDescriptor;

    #[test]
    fn test_split_reference() {
        assert_eq!(split_reference("redis:latest"), ("redis", "latest"));
        assert_eq!(split_reference("mygame"), ("mygame", "latest"));
        assert_eq!(
            split_reference("localhost:5000/game/cardinal"),
            ("localhost:5000/game/cardinal", "latest")
        );
        assert_eq!(
            split_reference("us-docker.pkg.dev/proj/repo/cardinal:v2"),
            ("us-docker.pkg.dev/proj/repo/cardinal", "v2")
        );
    }

    #[test]
    fn test_create_errors_name_the_missing_image() {
        let service = ServiceDescriptor::builder("game-cardinal")
            .image("game")
            .build()
            .unwrap();
        let server_error = |status_code| bollard::errors::Error::DockerResponseServerError {
            status_code,
            message: "error".to_string(),
        };

        let err = on_create_error(server_error(404), &service);
        assert!(matches!(&err, ContainerError::ConfigError(msg) if msg.contains("Image game ")));
        assert!(!err.is_not_found());

        let err = on_create_error(server_error(409), &service);
        assert!(matches!(err, ContainerError::AlreadyExists(name) if name == "game-cardinal"));
    }

    #[test]
    fn test_api_version_threshold() {
        assert!(api_at_least("1.39", BUILDKIT_MIN_API));
        assert!(api_at_least("1.45", BUILDKIT_MIN_API));
        assert!(api_at_least("2.0", BUILDKIT_MIN_API));
        assert!(!api_at_least("1.38", BUILDKIT_MIN_API));
        assert!(!api_at_least("garbage", BUILDKIT_MIN_API));
    }

    #[test]
    fn test_buildkit_resolution() {
        assert!(!resolve_buildkit(Some(false), Some("1.45")));
        assert!(!resolve_buildkit(None, Some("1.30")));
        assert!(!resolve_buildkit(None, None));
        assert_eq!(
            resolve_buildkit(None, Some("1.45")),
            cfg!(feature = "buildkit")
        );
        assert_eq!(
            resolve_buildkit(Some(true), None),
            cfg!(feature = "buildkit")
        );
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("FALSE"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_descriptor_conversion() {
        let service = ServiceDescriptor::builder("mygame-nakama-db")
            .image("cockroachdb/cockroach:latest-v23.1")
            .publish(26257)
            .expose(8080)
            .network("mygame")
            .volume("mygame", "/cockroach/cockroach-data")
            .restart_policy(RestartPolicy::OnFailure)
            .env("COCKROACH_PASSWORD", "secret")
            .build()
            .unwrap();

        let config = container_config(&service);
        let exposed = config.exposed_ports.unwrap();
        assert!(exposed.contains_key("26257/tcp"));
        assert!(exposed.contains_key("8080/tcp"));
        assert_eq!(config.env.unwrap(), vec!["COCKROACH_PASSWORD=secret"]);

        let host = config.host_config.unwrap();
        let bindings = host.port_bindings.unwrap();
        assert_eq!(bindings.len(), 1);
        let binding = bindings["26257/tcp"].as_ref().unwrap();
        assert_eq!(binding[0].host_port.as_deref(), Some("26257"));
        assert_eq!(host.network_mode.as_deref(), Some("mygame"));
        assert_eq!(
            host.restart_policy.unwrap().name,
            Some(RestartPolicyNameEnum::ON_FAILURE)
        );
        let mount = &host.mounts.unwrap()[0];
        assert_eq!(mount.typ, Some(MountTypeEnum::VOLUME));
        assert_eq!(mount.source.as_deref(), Some("mygame"));
    }

    #[test]
    fn test_health_check_in_nanoseconds() {
        let service = ServiceDescriptor::builder("svc")
            .image("alpine")
            .health_check(crate::container::HealthCheck::cmd(
                ["true"],
                Duration::from_secs(3),
                Duration::from_secs(2),
                5,
            ))
            .build()
            .unwrap();

        let health = container_config(&service).healthcheck.unwrap();
        assert_eq!(health.interval, Some(3_000_000_000));
        assert_eq!(health.timeout, Some(2_000_000_000));
        assert_eq!(health.retries, Some(5));
    }

    #[tokio::test]
    #[ignore] // Requires Docker/Podman to be running
    async fn test_client_connection() {
        let client = ContainerClient::new().await.unwrap();
        client.ping().await.unwrap();
        println!("Runtime type: {}", client.runtime_type().await.unwrap());
    }
}
