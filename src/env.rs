//! Environment constants and defaults for World CLI.
//!
//! This module centralizes the configuration keys, default values, and
//! well-known names used when materializing services, so that the registry
//! and the CLI agree on them.

/// Project configuration file name, looked up from the working directory upwards
pub const CONFIG_FILE_NAME: &str = "world.toml";

/// Environment variable overriding the configuration file location
pub const CONFIG_PATH_ENV: &str = "WORLD_CLI_CONFIG";

/// Environment variable holding a registry token for `build --push`
pub const REGISTRY_TOKEN_ENV: &str = "WORLD_REGISTRY_TOKEN";

/// Namespace used when `CARDINAL_NAMESPACE` is not configured
pub const DEFAULT_NAMESPACE: &str = "defaultnamespace";

/// Default seconds used for graceful stops and readiness waits
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Configuration keys read from `world.toml` or the process environment.
pub mod keys {
    pub const CARDINAL_NAMESPACE: &str = "CARDINAL_NAMESPACE";
    pub const REDIS_PASSWORD: &str = "REDIS_PASSWORD";
    pub const REDIS_PORT: &str = "REDIS_PORT";
    pub const REDIS_ADDRESS: &str = "REDIS_ADDRESS";
    pub const DB_PASSWORD: &str = "DB_PASSWORD";
    pub const NAKAMA_IMAGE: &str = "NAKAMA_IMAGE";
    pub const ENABLE_ALLOWLIST: &str = "ENABLE_ALLOWLIST";
    pub const OUTGOING_QUEUE_SIZE: &str = "OUTGOING_QUEUE_SIZE";
    pub const DA_BASE_URL: &str = "DA_BASE_URL";
    pub const DA_AUTH_TOKEN: &str = "DA_AUTH_TOKEN";
    pub const DA_NAMESPACE_ID: &str = "DA_NAMESPACE_ID";
    pub const FAUCET_ENABLED: &str = "FAUCET_ENABLED";
    pub const FAUCET_ADDRESS: &str = "FAUCET_ADDRESS";
    pub const FAUCET_AMOUNT: &str = "FAUCET_AMOUNT";
    pub const BASE_SHARD_ROUTER_KEY: &str = "BASE_SHARD_ROUTER_KEY";

    /// Keys that may be overridden from the process environment.
    pub const ALL: &[&str] = &[
        CARDINAL_NAMESPACE,
        REDIS_PASSWORD,
        REDIS_PORT,
        REDIS_ADDRESS,
        DB_PASSWORD,
        NAKAMA_IMAGE,
        ENABLE_ALLOWLIST,
        OUTGOING_QUEUE_SIZE,
        DA_BASE_URL,
        DA_AUTH_TOKEN,
        DA_NAMESPACE_ID,
        FAUCET_ENABLED,
        FAUCET_ADDRESS,
        FAUCET_AMOUNT,
        BASE_SHARD_ROUTER_KEY,
    ];
}

/// Default values for optional configuration keys.
pub mod defaults {
    pub const REDIS_PASSWORD: &str = "very_unsafe_password_replace_me";
    pub const REDIS_PORT: &str = "6379";
    pub const DB_PASSWORD: &str = "very_unsafe_password_replace_me";
    pub const NAKAMA_IMAGE: &str = "heroiclabs/nakama:3.22.0";
    pub const ENABLE_ALLOWLIST: &str = "false";
    pub const OUTGOING_QUEUE_SIZE: &str = "100";
    pub const DA_NAMESPACE_ID: &str = "67480c4a88c4d12935d4";
    pub const FAUCET_ENABLED: &str = "false";
    pub const FAUCET_AMOUNT: &str = "0x56BC75E2D63100000";
}

/// Image references for the services World CLI runs.
pub mod images {
    pub const REDIS: &str = "redis:latest";
    pub const COCKROACH: &str = "cockroachdb/cockroach:latest-v23.1";
    pub const CELESTIA_DEVNET: &str = "ghcr.io/rollkit/local-celestia-devnet:latest";
    pub const EVM: &str = "ghcr.io/argus-labs/world-engine-evm:1.4.1";
    pub const GO_BUILDER: &str = "golang:1.22";
    pub const DISTROLESS: &str = "gcr.io/distroless/base-debian12";
}

/// Build context layout for locally built services.
pub mod build {
    /// Files at the project root that are always sent with the build context
    pub const MANIFEST_FILES: &[&str] = &["world.toml"];

    /// Directory prefixes (relative to the project root) sent with the build context
    pub const SOURCE_PREFIXES: &[&str] = &["cardinal/"];

    /// Name of the Dockerfile entry inside the build context
    pub const DOCKERFILE_NAME: &str = "Dockerfile";

    /// Cardinal runtime stage
    pub const TARGET_RUNTIME: &str = "runtime";

    /// Cardinal runtime stage with a headless debugger
    pub const TARGET_RUNTIME_DEBUG: &str = "runtime-debug";

    /// Platform locally built images are produced for
    pub const PLATFORM: &str = "linux/amd64";
}

/// Celestia devnet bridge settings used by the settlement shard.
pub mod celestia {
    pub const BRIDGE_STORE: &str = "/home/celestia/bridge";
    pub const BRIDGE_PORT: u16 = 26659;
}
