//! Service descriptors.
//!
//! A [`ServiceDescriptor`] is the immutable description of one container in an
//! environment: where its image comes from, how it is configured, and how it
//! is attached to the host. Descriptors are only constructed through
//! [`ServiceDescriptorBuilder`], which validates ports and provenance.

use crate::container::{ContainerError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;

/// A TCP port in the range 1-65535.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Port(u16);

impl Port {
    /// Validate a port number.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::ConfigError`] for values outside 1-65535.
    pub fn new(value: u32) -> Result<Self> {
        match u16::try_from(value) {
            Ok(port) if port != 0 => Ok(Self(port)),
            _ => Err(ContainerError::ConfigError(format!(
                "Invalid port {}: must be between 1 and 65535",
                value
            ))),
        }
    }

    /// Parse a port from configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::ConfigError`] if the text is not a valid port.
    pub fn parse(text: &str) -> Result<Self> {
        let value: u32 = text.trim().parse().map_err(|_| {
            ContainerError::ConfigError(format!("Invalid port '{}': not a number", text))
        })?;
        Self::new(value)
    }

    /// Port number.
    pub fn get(self) -> u16 {
        self.0
    }

    /// Docker port key, e.g. `4040/tcp`.
    pub fn tcp_key(self) -> String {
        format!("{}/tcp", self.0)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Container restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    /// Restart unless explicitly stopped
    #[default]
    UnlessStopped,
    /// Restart only after a non-zero exit
    OnFailure,
    /// Never restart
    No,
}

/// Container health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    /// Test command in Docker form, e.g. `["CMD", "curl", "-f", "..."]`
    pub test: Vec<String>,
    /// Time between checks
    pub interval: Duration,
    /// Time a single check may take
    pub timeout: Duration,
    /// Consecutive failures before the container is unhealthy
    pub retries: u32,
}

impl HealthCheck {
    /// Health check running `cmd` through `CMD`.
    pub fn cmd<I, S>(cmd: I, interval: Duration, timeout: Duration, retries: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut test = vec!["CMD".to_string()];
        test.extend(cmd.into_iter().map(Into::into));
        Self {
            test,
            interval,
            timeout,
            retries,
        }
    }
}

/// Named volume mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    /// Volume name
    pub source: String,
    /// Mount point inside the container
    pub target: String,
}

/// Embedded Dockerfile a service is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerfileSource {
    /// Dockerfile content
    pub content: String,
    /// Build stage to stop at
    pub target: String,
}

/// Immutable description of one service in an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Container name, unique within the environment
    pub name: String,
    /// Image reference (the build tag for locally built services)
    pub image: String,
    /// Dockerfile for locally built services
    pub dockerfile: Option<DockerfileSource>,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Container ports exposed on the network
    pub exposed_ports: BTreeSet<Port>,
    /// Container port to host port bindings
    pub port_bindings: BTreeMap<Port, Port>,
    /// Health check
    pub health_check: Option<HealthCheck>,
    /// Network the container joins
    pub network: String,
    /// Named volume mount
    pub volume: Option<VolumeMount>,
    /// Images that must exist before this one builds
    pub dependencies: Vec<ServiceDescriptor>,
    /// Restart policy
    pub restart_policy: RestartPolicy,
    /// Command override
    pub cmd: Option<Vec<String>>,
    /// Entrypoint override
    pub entrypoint: Option<Vec<String>>,
    /// Target platform, e.g. `linux/amd64`
    pub platform: Option<String>,
    /// Added kernel capabilities
    pub cap_add: Vec<String>,
    /// Security options
    pub security_opt: Vec<String>,
}

impl ServiceDescriptor {
    /// Create a new descriptor builder.
    pub fn builder<S: Into<String>>(name: S) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder::new(name)
    }

    /// Whether the image is built locally rather than pulled.
    pub fn is_built(&self) -> bool {
        self.dockerfile.is_some()
    }

    /// Environment in Docker `KEY=VALUE` form, sorted by key.
    pub fn env_list(&self) -> Vec<String> {
        let mut env: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        env.sort();
        env
    }
}

/// Builder for [`ServiceDescriptor`].
///
/// Ports are validated when the descriptor is built; a binding implies the
/// container port is exposed.
pub struct ServiceDescriptorBuilder {
    name: String,
    image: Option<String>,
    dockerfile: Option<DockerfileSource>,
    env: HashMap<String, String>,
    exposed_ports: Vec<u32>,
    port_bindings: Vec<(u32, u32)>,
    health_check: Option<HealthCheck>,
    network: Option<String>,
    volume: Option<VolumeMount>,
    dependencies: Vec<ServiceDescriptor>,
    restart_policy: RestartPolicy,
    cmd: Option<Vec<String>>,
    entrypoint: Option<Vec<String>>,
    platform: Option<String>,
    cap_add: Vec<String>,
    security_opt: Vec<String>,
}

impl ServiceDescriptorBuilder {
    /// Create a builder for a service named `name`.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            image: None,
            dockerfile: None,
            env: HashMap::new(),
            exposed_ports: Vec::new(),
            port_bindings: Vec::new(),
            health_check: None,
            network: None,
            volume: None,
            dependencies: Vec::new(),
            restart_policy: RestartPolicy::default(),
            cmd: None,
            entrypoint: None,
            platform: None,
            cap_add: Vec::new(),
            security_opt: Vec::new(),
        }
    }

    /// Set the image reference.
    pub fn image<S: Into<String>>(mut self, image: S) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Build the image locally from `content`, stopping at stage `target`.
    pub fn dockerfile<C: Into<String>, T: Into<String>>(mut self, content: C, target: T) -> Self {
        self.dockerfile = Some(DockerfileSource {
            content: content.into(),
            target: target.into(),
        });
        self
    }

    /// Add an environment variable.
    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add multiple environment variables.
    pub fn envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in envs {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// Expose a container port without binding it on the host.
    pub fn expose(mut self, port: u32) -> Self {
        self.exposed_ports.push(port);
        self
    }

    /// Expose a container port and bind it to the same host port.
    pub fn publish(self, port: u32) -> Self {
        self.publish_as(port, port)
    }

    /// Expose a container port and bind it to `host_port`.
    pub fn publish_as(mut self, container_port: u32, host_port: u32) -> Self {
        self.port_bindings.push((container_port, host_port));
        self
    }

    /// Set the health check.
    pub fn health_check(mut self, health_check: HealthCheck) -> Self {
        self.health_check = Some(health_check);
        self
    }

    /// Set the network the container joins.
    pub fn network<S: Into<String>>(mut self, network: S) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Mount a named volume.
    pub fn volume<S: Into<String>, T: Into<String>>(mut self, source: S, target: T) -> Self {
        self.volume = Some(VolumeMount {
            source: source.into(),
            target: target.into(),
        });
        self
    }

    /// Require `dependency`'s image before this service builds.
    pub fn depends_on(mut self, dependency: ServiceDescriptor) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Set the restart policy.
    pub fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// Set the command.
    pub fn cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = Some(cmd.into_iter().map(Into::into).collect());
        self
    }

    /// Set the entrypoint.
    pub fn entrypoint<I, S>(mut self, entrypoint: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entrypoint = Some(entrypoint.into_iter().map(Into::into).collect());
        self
    }

    /// Set the target platform.
    pub fn platform<S: Into<String>>(mut self, platform: S) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Add a kernel capability.
    pub fn cap_add<S: Into<String>>(mut self, capability: S) -> Self {
        self.cap_add.push(capability.into());
        self
    }

    /// Add a security option.
    pub fn security_opt<S: Into<String>>(mut self, option: S) -> Self {
        self.security_opt.push(option.into());
        self
    }

    /// Build the service descriptor.
    ///
    /// A locally built service without an explicit image is tagged with its name.
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty, neither image nor Dockerfile is set,
    /// or any port is outside 1-65535.
    pub fn build(self) -> Result<ServiceDescriptor> {
        if self.name.trim().is_empty() {
            return Err(ContainerError::ConfigError(
                "Service name is required".to_string(),
            ));
        }

        let image = match (self.image, &self.dockerfile) {
            (Some(image), _) => image,
            (None, Some(_)) => self.name.clone(),
            (None, None) => {
                return Err(ContainerError::ConfigError(format!(
                    "Service {} needs an image or a Dockerfile",
                    self.name
                )));
            }
        };

        let mut exposed_ports = BTreeSet::new();
        for port in self.exposed_ports {
            exposed_ports.insert(Port::new(port)?);
        }

        let mut port_bindings = BTreeMap::new();
        for (container_port, host_port) in self.port_bindings {
            let container_port = Port::new(container_port)?;
            port_bindings.insert(container_port, Port::new(host_port)?);
            exposed_ports.insert(container_port);
        }

        Ok(ServiceDescriptor {
            network: self.network.unwrap_or_else(|| "bridge".to_string()),
            name: self.name,
            image,
            dockerfile: self.dockerfile,
            env: self.env,
            exposed_ports,
            port_bindings,
            health_check: self.health_check,
            volume: self.volume,
            dependencies: self.dependencies,
            restart_policy: self.restart_policy,
            cmd: self.cmd,
            entrypoint: self.entrypoint,
            platform: self.platform,
            cap_add: self.cap_add,
            security_opt: self.security_opt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_range() {
        assert!(Port::new(0).is_err());
        assert!(Port::new(70000).is_err());
        assert_eq!(Port::new(8080).unwrap().get(), 8080);
        assert_eq!(Port::new(65535).unwrap().get(), 65535);
        assert!(Port::parse("http").is_err());
        assert_eq!(Port::parse(" 6379 ").unwrap().tcp_key(), "6379/tcp");
    }

    #[test]
    fn test_invalid_port_fails_construction() {
        for bad in [0, 70000] {
            let result = ServiceDescriptor::builder("svc")
                .image("redis:latest")
                .publish(bad)
                .build();
            assert!(matches!(result, Err(ContainerError::ConfigError(_))));

            let result = ServiceDescriptor::builder("svc")
                .image("redis:latest")
                .expose(bad)
                .build();
            assert!(matches!(result, Err(ContainerError::ConfigError(_))));
        }

        let service = ServiceDescriptor::builder("svc")
            .image("redis:latest")
            .publish(8080)
            .build()
            .unwrap();
        assert!(service.exposed_ports.contains(&Port::new(8080).unwrap()));
    }

    #[test]
    fn test_binding_implies_exposure() {
        let service = ServiceDescriptor::builder("db")
            .image("cockroachdb/cockroach:latest-v23.1")
            .publish_as(26257, 26258)
            .expose(8080)
            .build()
            .unwrap();

        let bound = Port::new(26257).unwrap();
        assert!(service.exposed_ports.contains(&bound));
        assert_eq!(service.port_bindings[&bound].get(), 26258);
        assert!(!service.port_bindings.contains_key(&Port::new(8080).unwrap()));
    }

    #[test]
    fn test_provenance() {
        let missing = ServiceDescriptor::builder("svc").build();
        assert!(matches!(missing, Err(ContainerError::ConfigError(_))));

        let built = ServiceDescriptor::builder("game-cardinal")
            .dockerfile("FROM scratch", "runtime")
            .build()
            .unwrap();
        assert!(built.is_built());
        assert_eq!(built.image, "game-cardinal");
    }

    #[test]
    fn test_env_list_is_sorted() {
        let service = ServiceDescriptor::builder("svc")
            .image("alpine")
            .env("B", "2")
            .envs([("A", "1")])
            .build()
            .unwrap();
        assert_eq!(service.env_list(), vec!["A=1", "B=2"]);
    }

    #[test]
    fn test_health_check_cmd() {
        let hc = HealthCheck::cmd(
            ["curl", "-f", "http://localhost:8080"],
            Duration::from_secs(3),
            Duration::from_secs(3),
            5,
        );
        assert_eq!(hc.test[0], "CMD");
        assert_eq!(hc.test.len(), 4);
    }
}
