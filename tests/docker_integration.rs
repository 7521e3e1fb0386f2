//! Integration tests against a real Docker/Podman daemon.
//!
//! Tests are skipped if Docker/Podman is not available or SKIP_CONTAINER_TESTS=1.

use serial_test::serial;
use std::time::Duration;
use test_tag::tag;
use tokio_util::sync::CancellationToken;
use world_cli::config::RuntimeConfig;
use world_cli::container::{
    ContainerClient, Engine, Orchestrator, RuntimeType, ServiceDescriptor, StatusSender,
};
use world_cli::env::keys;

const NAMESPACE: &str = "world-cli-it";

/// Check if container tests should run.
fn should_run_container_tests() -> bool {
    if let Ok(value) = std::env::var("SKIP_CONTAINER_TESTS")
        && (value == "1" || value.eq_ignore_ascii_case("true"))
    {
        return false;
    }

    std::process::Command::new("docker")
        .arg("info")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
        || std::process::Command::new("podman")
            .arg("info")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
}

fn config() -> RuntimeConfig {
    RuntimeConfig {
        detach: true,
        timeout_seconds: 5,
        ..RuntimeConfig::with_env([(keys::CARDINAL_NAMESPACE, NAMESPACE)])
    }
}

fn sleeper(name: &str) -> ServiceDescriptor {
    ServiceDescriptor::builder(format!("{}-{}", NAMESPACE, name))
        .image("alpine:latest")
        .cmd(["sleep", "300"])
        .network(NAMESPACE)
        .build()
        .unwrap()
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_container_client_connection() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests (Docker/Podman not available or SKIP_CONTAINER_TESTS=1)");
        return;
    }

    let client = ContainerClient::new().await;
    assert!(
        client.is_ok(),
        "Failed to connect to Docker/Podman: {:?}",
        client.err()
    );

    let runtime = client.unwrap().runtime_type().await.unwrap();
    assert!(matches!(runtime, RuntimeType::Docker | RuntimeType::Podman));
}

#[tokio::test]
#[serial]
#[ignore = "pulls images and starts containers"]
#[tag(integration, container)]
async fn test_start_stop_purge_round() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }

    let client = ContainerClient::new().await.unwrap();
    let services = vec![sleeper("one"), sleeper("two")];
    let orchestrator = Orchestrator::with_engine(
        config(),
        std::sync::Arc::new(client.clone()),
        StatusSender::disabled(),
    );

    orchestrator
        .start(&services, CancellationToken::new())
        .await
        .unwrap();
    for service in &services {
        assert!(client.container_running(&service.name).await.unwrap());
    }

    // Starting again is a no-op for running containers
    orchestrator
        .start(&services, CancellationToken::new())
        .await
        .unwrap();

    orchestrator.stop(&services).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    for service in &services {
        assert!(!client.container_running(&service.name).await.unwrap());
    }

    orchestrator.purge(&services).await.unwrap();
    for service in &services {
        assert!(!client.container_exists(&service.name).await.unwrap());
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires a container runtime"]
#[tag(integration, container)]
async fn test_exec_collects_output() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }

    let client = ContainerClient::new().await.unwrap();
    let service = sleeper("exec");
    let orchestrator = Orchestrator::with_engine(
        config(),
        std::sync::Arc::new(client.clone()),
        StatusSender::disabled(),
    );
    orchestrator
        .start(std::slice::from_ref(&service), CancellationToken::new())
        .await
        .unwrap();

    let output = client
        .exec(&service.name, &["echo".to_string(), "hello".to_string()])
        .await
        .unwrap();
    assert!(output.success());
    assert_eq!(output.stdout.trim(), "hello");

    orchestrator.purge(&[service]).await.unwrap();
}
