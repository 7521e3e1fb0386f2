//! Command line argument parsing
//!
//! This module handles CLI argument parsing with subcommands:
//! - `start`: Start the game stack, following logs unless detached
//! - `stop`: Stop every container of the stack
//! - `restart`: Stop then start the stack
//! - `purge`: Remove every container and the shared volume
//! - `build`: Build local images, optionally pushing them to a registry
//! - `evm start`: Start the EVM settlement shard

use crate::config::RuntimeConfig;
use crate::env;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Start(StartConfig),
    Stop,
    Restart(StartConfig),
    Purge,
    Build(BuildConfig),
    EvmStart(StartConfig),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StartConfig {
    pub detach: bool,
    pub build: bool,
    pub debug: bool,
    pub timeout: Option<u64>,
}

impl StartConfig {
    /// Overlay the command line flags on a loaded configuration.
    pub fn apply(&self, config: &mut RuntimeConfig) {
        config.detach |= self.detach;
        config.build |= self.build;
        config.debug |= self.debug;
        if let Some(timeout) = self.timeout {
            config.timeout_seconds = timeout;
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub debug: bool,
    pub push: Option<String>,
    pub auth: Option<String>,
}

#[derive(Debug, Parser)]
#[command(name = "world")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run and manage World Engine game stacks on Docker")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct StartArgs {
    /// Return once every container is running instead of following logs
    #[arg(short = 'd', long = "detach")]
    pub detach: bool,
    /// Build local images before starting
    #[arg(short = 'b', long = "build")]
    pub build: bool,
    /// Use debug build targets and enable the debugger port
    #[arg(long = "debug")]
    pub debug: bool,
    /// Seconds to wait for graceful stops and readiness
    #[arg(short = 't', long = "timeout", value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

impl From<&StartArgs> for StartConfig {
    fn from(args: &StartArgs) -> Self {
        Self {
            detach: args.detach,
            build: args.build,
            debug: args.debug,
            timeout: args.timeout,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the game stack
    Start(StartArgs),
    /// Stop every container of the game stack
    Stop,
    /// Stop then start the game stack
    Restart(StartArgs),
    /// Remove every container and the shared volume
    Purge,
    /// Build local images
    Build {
        /// Use debug build targets
        #[arg(long = "debug")]
        debug: bool,
        /// Registry repository to push built images to
        #[arg(long = "push", value_name = "DEST")]
        push: Option<String>,
        /// Registry access token
        #[arg(long = "auth", value_name = "TOKEN", env = env::REGISTRY_TOKEN_ENV, hide_env_values = true)]
        auth: Option<String>,
    },
    /// EVM settlement shard commands
    Evm {
        #[command(subcommand)]
        command: EvmCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum EvmCommands {
    /// Start the Celestia devnet and the EVM node
    Start(StartArgs),
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Start(args)) => Ok(ExecutionMode::Start(args.into())),
            Some(Commands::Stop) => Ok(ExecutionMode::Stop),
            Some(Commands::Restart(args)) => Ok(ExecutionMode::Restart(args.into())),
            Some(Commands::Purge) => Ok(ExecutionMode::Purge),
            Some(Commands::Build { debug, push, auth }) => Ok(ExecutionMode::Build(BuildConfig {
                debug: *debug,
                push: push.clone(),
                // A token is only meaningful together with a destination
                auth: push.as_ref().and(auth.clone()),
            })),
            Some(Commands::Evm {
                command: EvmCommands::Start(args),
            }) => Ok(ExecutionMode::EvmStart(args.into())),
            None => {
                Err("No command specified. Use 'world --help' to see available commands.".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_start_flags() {
        let args = parse(&["world", "start", "--detach", "--build", "-t", "5"]);
        let ExecutionMode::Start(config) = args.mode().unwrap() else {
            panic!("Expected Start mode");
        };
        assert_eq!(
            config,
            StartConfig {
                detach: true,
                build: true,
                debug: false,
                timeout: Some(5),
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["world", "stop", "--verbose", "--config", "/tmp/world.toml"]);
        assert!(args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/world.toml")));
        assert_eq!(args.mode().unwrap(), ExecutionMode::Stop);
    }

    #[test]
    fn test_evm_start() {
        let args = parse(&["world", "evm", "start", "-d"]);
        let ExecutionMode::EvmStart(config) = args.mode().unwrap() else {
            panic!("Expected EvmStart mode");
        };
        assert!(config.detach);
    }

    #[test]
    fn test_build_auth_only_with_push() {
        let build = |push: Option<&str>| Args {
            config: None,
            verbose: false,
            command: Some(Commands::Build {
                debug: false,
                push: push.map(str::to_string),
                auth: Some("token".to_string()),
            }),
        };

        let ExecutionMode::Build(config) = build(None).mode().unwrap() else {
            panic!("Expected Build mode");
        };
        assert_eq!(config.auth, None);

        let ExecutionMode::Build(config) = build(Some("registry.example.com/game")).mode().unwrap()
        else {
            panic!("Expected Build mode");
        };
        assert_eq!(config.push.as_deref(), Some("registry.example.com/game"));
        assert_eq!(config.auth.as_deref(), Some("token"));
    }

    #[test]
    fn test_start_config_overlays_runtime_config() {
        let mut config = RuntimeConfig {
            build: true,
            ..Default::default()
        };
        StartConfig {
            detach: true,
            timeout: Some(3),
            ..Default::default()
        }
        .apply(&mut config);

        assert!(config.detach);
        assert!(config.build);
        assert!(!config.debug);
        assert_eq!(config.timeout_seconds, 3);
    }

    #[test]
    fn test_no_command_error() {
        let args = Args {
            config: None,
            verbose: false,
            command: None,
        };
        assert!(args.mode().is_err());
    }
}
