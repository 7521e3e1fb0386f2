//! # World CLI
//!
//! Local orchestration of World Engine game stacks on Docker: a Cardinal
//! game shard, the Nakama relay and its database, Redis, and an optional EVM
//! settlement shard backed by a Celestia devnet.
//!
//! ## Architecture Overview
//!
//! - **[`container`]**: the orchestration engine (service registry, shared
//!   resources, image pipeline, container lifecycle, log following)
//! - **[`config`]**: `world.toml` discovery and the runtime configuration
//! - **[`cli`]**: argument parsing and status rendering for the `world` binary
//! - **[`env`]**: well-known names, images, and defaults
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use world_cli::config::ConfigDiscovery;
//! use world_cli::container::{registry, Orchestrator, Role, StatusSender};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = ConfigDiscovery::discover(None)?;
//!     config.detach = true;
//!
//!     let services = registry::materialize_all(Role::LOCAL, &config)?;
//!     let orchestrator = Orchestrator::connect(config, StatusSender::disabled()).await?;
//!     orchestrator.start(&services, CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

/// Multi-container orchestration engine.
///
/// Drives Docker through the [`container::Engine`] seam with concurrent batch
/// operations and live status reporting.
pub mod container;

/// Runtime configuration loading and discovery.
pub mod config;

/// Well-known names, images, and default values.
pub mod env;

// CLI module for command-line interface
pub mod cli;

pub use config::{ConfigDiscovery, RuntimeConfig};
pub use container::{ContainerError, Orchestrator, ServiceDescriptor};
