use anyhow::{Context, Result};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use world_cli::cli::{Args, ExecutionMode, spawn_printer};
use world_cli::config::{ConfigDiscovery, RuntimeConfig};
use world_cli::container::{Orchestrator, PushTarget, Role, StatusSender, registry};

/// Buffered status events between the engine and the printer.
const STATUS_CAPACITY: usize = 64;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(args.config.as_deref(), mode).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "world_cli=debug"
    } else {
        "world_cli=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(config_path: Option<&Path>, mode: ExecutionMode) -> Result<()> {
    let config = ConfigDiscovery::discover(config_path).context("Failed to load configuration")?;

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let (status, rx) = StatusSender::channel(STATUS_CAPACITY);
    let printer = spawn_printer(rx);

    let result = execute(config, mode, status, cancel).await;

    if let Err(e) = printer.await {
        warn!("Status printer failed: {}", e);
    }
    result
}

async fn execute(
    mut config: RuntimeConfig,
    mode: ExecutionMode,
    status: StatusSender,
    cancel: CancellationToken,
) -> Result<()> {
    match mode {
        ExecutionMode::Start(flags) => {
            flags.apply(&mut config);
            let services = registry::materialize_all(Role::LOCAL, &config)?;
            let orchestrator = connect(config, status).await?;
            orchestrator.start(&services, cancel).await?;
        }
        ExecutionMode::Stop => {
            let services = registry::materialize_all(Role::ALL, &config)?;
            let orchestrator = connect(config, status).await?;
            orchestrator.stop(&services).await?;
        }
        ExecutionMode::Restart(flags) => {
            flags.apply(&mut config);
            let services = registry::materialize_all(Role::LOCAL, &config)?;
            let orchestrator = connect(config, status).await?;
            orchestrator.restart(&services, cancel).await?;
        }
        ExecutionMode::Purge => {
            let services = registry::materialize_all(Role::ALL, &config)?;
            let orchestrator = connect(config, status).await?;
            orchestrator.purge(&services).await?;
        }
        ExecutionMode::Build(build) => {
            config.debug |= build.debug;
            let services = registry::materialize_all(&[Role::Cardinal], &config)?;
            let target = build
                .push
                .map(|destination| PushTarget::new(destination, build.auth));
            let orchestrator = connect(config, status).await?;

            tokio::select! {
                _ = cancel.cancelled() => info!("Build cancelled"),
                result = orchestrator.build(&services, target.as_ref()) => result?,
            }
        }
        ExecutionMode::EvmStart(flags) => {
            flags.apply(&mut config);
            let orchestrator = connect(config, status).await?;
            orchestrator.start_settlement_shard(cancel).await?;
        }
    }
    Ok(())
}

async fn connect(config: RuntimeConfig, status: StatusSender) -> Result<Orchestrator> {
    Orchestrator::connect(config, status)
        .await
        .context("Failed to connect to the container runtime; is Docker running?")
}

fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                cancel.cancel();
            }
            Err(e) => warn!("Failed to listen for interrupts: {}", e),
        }
    });
}
