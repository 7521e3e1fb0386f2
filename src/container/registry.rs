//! Built-in services of a World Engine stack.
//!
//! [`materialize`] turns a [`Role`] and the runtime configuration into a
//! [`ServiceDescriptor`]. It performs no I/O; every optional configuration key
//! falls back to a documented default from [`crate::env::defaults`].

use crate::config::RuntimeConfig;
use crate::container::{HealthCheck, Port, Result, ServiceDescriptor};
use crate::env::{self, defaults, images, keys};
use std::fmt;
use std::time::Duration;

/// Dockerfile the Cardinal image is built from.
pub const CARDINAL_DOCKERFILE: &str = include_str!("templates/cardinal.Dockerfile");

/// Cardinal game server port.
pub const CARDINAL_PORT: u32 = 4040;

/// Headless debugger port of debug Cardinal builds.
pub const CARDINAL_DEBUG_PORT: u32 = 40000;

/// Redis port inside the container.
const REDIS_CONTAINER_PORT: u32 = 6379;

/// A logical service of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Cardinal,
    Nakama,
    NakamaDb,
    Redis,
    CelestiaDevnet,
    Evm,
}

impl Role {
    /// Services of a local game stack.
    pub const LOCAL: &'static [Role] = &[Role::NakamaDb, Role::Redis, Role::Cardinal, Role::Nakama];

    /// Services of the EVM settlement shard.
    pub const EVM: &'static [Role] = &[Role::CelestiaDevnet, Role::Evm];

    /// Every service the CLI manages.
    pub const ALL: &'static [Role] = &[
        Role::NakamaDb,
        Role::Redis,
        Role::Cardinal,
        Role::Nakama,
        Role::CelestiaDevnet,
        Role::Evm,
    ];

    /// Container name suffix.
    pub fn suffix(self) -> &'static str {
        match self {
            Role::Cardinal => "cardinal",
            Role::Nakama => "nakama",
            Role::NakamaDb => "nakama-db",
            Role::Redis => "redis",
            Role::CelestiaDevnet => "celestia-devnet",
            Role::Evm => "evm",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Container name of `role` in the configured namespace.
pub fn container_name(config: &RuntimeConfig, role: Role) -> String {
    format!("{}-{}", config.namespace(), role.suffix())
}

/// Describe the service for `role`.
///
/// Every service joins the namespace network and inherits the full
/// configuration environment, with role-specific values layered on top.
///
/// # Errors
///
/// Returns [`crate::container::ContainerError::ConfigError`] if a configured
/// port is invalid.
pub fn materialize(role: Role, config: &RuntimeConfig) -> Result<ServiceDescriptor> {
    let namespace = config.namespace();
    let builder = ServiceDescriptor::builder(container_name(config, role))
        .network(namespace.as_str())
        .envs(config.env.clone());

    match role {
        Role::Cardinal => {
            let target = if config.debug {
                env::build::TARGET_RUNTIME_DEBUG
            } else {
                env::build::TARGET_RUNTIME
            };
            let redis_password = config.env_or(keys::REDIS_PASSWORD, defaults::REDIS_PASSWORD);

            let mut builder = builder
                .image(namespace.as_str())
                .dockerfile(CARDINAL_DOCKERFILE, target)
                .platform(env::build::PLATFORM)
                .env(keys::CARDINAL_NAMESPACE, namespace.as_str())
                .env(keys::REDIS_PASSWORD, redis_password)
                .env(
                    keys::REDIS_ADDRESS,
                    format!(
                        "{}:{}",
                        container_name(config, Role::Redis),
                        REDIS_CONTAINER_PORT
                    ),
                )
                .publish(CARDINAL_PORT)
                .depends_on(base_image(images::GO_BUILDER)?)
                .depends_on(base_image(images::DISTROLESS)?);

            if config.debug {
                builder = builder
                    .publish(CARDINAL_DEBUG_PORT)
                    .cap_add("SYS_PTRACE")
                    .security_opt("apparmor:unconfined");
            }
            builder.build()
        }

        Role::Redis => {
            let password = config.env_or(keys::REDIS_PASSWORD, defaults::REDIS_PASSWORD);
            let host_port = Port::parse(&config.env_or(keys::REDIS_PORT, defaults::REDIS_PORT))?;

            builder
                .image(images::REDIS)
                .cmd(["redis-server", "--requirepass", password.as_str()])
                .publish_as(REDIS_CONTAINER_PORT, u32::from(host_port.get()))
                .volume(namespace.as_str(), "/redis")
                .build()
        }

        Role::NakamaDb => {
            let password = config.env_or(keys::DB_PASSWORD, defaults::DB_PASSWORD);

            builder
                .image(images::COCKROACH)
                .cmd(["start-single-node", "--insecure"])
                .env("COCKROACH_DATABASE", "nakama")
                .env("COCKROACH_USER", "root")
                .env("COCKROACH_PASSWORD", password)
                .publish(26257)
                .publish(8080)
                .volume(namespace.as_str(), "/cockroach/cockroach-data")
                .health_check(HealthCheck::cmd(
                    ["curl", "-f", "http://localhost:8080/health?ready=1"],
                    Duration::from_secs(3),
                    Duration::from_secs(3),
                    5,
                ))
                .build()
        }

        Role::Nakama => {
            let image = config.env_or(keys::NAKAMA_IMAGE, defaults::NAKAMA_IMAGE);
            let password = config.env_or(keys::DB_PASSWORD, defaults::DB_PASSWORD);
            let queue_size =
                config.env_or(keys::OUTGOING_QUEUE_SIZE, defaults::OUTGOING_QUEUE_SIZE);
            let database = format!(
                "root:{}@{}:26257/nakama",
                password,
                container_name(config, Role::NakamaDb)
            );
            let script = format!(
                "/nakama/nakama migrate up --database.address {db} && \
                 exec /nakama/nakama --config /nakama/data/local.yml \
                 --database.address {db} --socket.outgoing_queue_size={queue} \
                 --logger.level INFO",
                db = database,
                queue = queue_size,
            );

            builder
                .image(image)
                .entrypoint(["/bin/sh", "-ecx", script.as_str()])
                .env(
                    "CARDINAL_ADDR",
                    format!("{}:{}", container_name(config, Role::Cardinal), CARDINAL_PORT),
                )
                .env(keys::CARDINAL_NAMESPACE, namespace.as_str())
                .env(
                    keys::ENABLE_ALLOWLIST,
                    config.env_or(keys::ENABLE_ALLOWLIST, defaults::ENABLE_ALLOWLIST),
                )
                .publish(7349)
                .publish(7350)
                .publish(7351)
                .publish(9100)
                .health_check(HealthCheck::cmd(
                    ["/nakama/nakama", "healthcheck"],
                    Duration::from_secs(5),
                    Duration::from_secs(3),
                    5,
                ))
                .build()
        }

        Role::CelestiaDevnet => {
            let head = format!("http://127.0.0.1:{}/head", env::celestia::BRIDGE_PORT);

            builder
                .image(images::CELESTIA_DEVNET)
                // 26657 and 9090 stay internal; the EVM node binds them on the host
                .expose(26657)
                .expose(9090)
                .publish(26658)
                .publish(u32::from(env::celestia::BRIDGE_PORT))
                .health_check(HealthCheck::cmd(
                    ["curl", "-f", head.as_str()],
                    Duration::from_secs(1),
                    Duration::from_secs(1),
                    20,
                ))
                .build()
        }

        Role::Evm => {
            let da_base_url = config.env_or(
                keys::DA_BASE_URL,
                &format!(
                    "http://{}:26658",
                    container_name(config, Role::CelestiaDevnet)
                ),
            );

            builder
                .image(images::EVM)
                .env(keys::DA_BASE_URL, da_base_url)
                .env(keys::DA_AUTH_TOKEN, config.env_or(keys::DA_AUTH_TOKEN, ""))
                .env(
                    keys::DA_NAMESPACE_ID,
                    config.env_or(keys::DA_NAMESPACE_ID, defaults::DA_NAMESPACE_ID),
                )
                .env(
                    keys::FAUCET_ENABLED,
                    config.env_or(keys::FAUCET_ENABLED, defaults::FAUCET_ENABLED),
                )
                .env(
                    keys::FAUCET_ADDRESS,
                    config.env_or(keys::FAUCET_ADDRESS, ""),
                )
                .env(
                    keys::FAUCET_AMOUNT,
                    config.env_or(keys::FAUCET_AMOUNT, defaults::FAUCET_AMOUNT),
                )
                .env(
                    keys::BASE_SHARD_ROUTER_KEY,
                    config.env_or(keys::BASE_SHARD_ROUTER_KEY, ""),
                )
                .publish(1317)
                .publish(26657)
                .publish(9090)
                .publish(9601)
                .build()
        }
    }
}

/// Describe every service of `roles`, in order.
///
/// # Errors
///
/// Returns the first materialization error.
pub fn materialize_all(roles: &[Role], config: &RuntimeConfig) -> Result<Vec<ServiceDescriptor>> {
    roles.iter().map(|role| materialize(*role, config)).collect()
}

/// A pull-only image a build depends on.
fn base_image(image: &str) -> Result<ServiceDescriptor> {
    ServiceDescriptor::builder(image).image(image).build()
}
