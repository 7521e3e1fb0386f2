//! Image pull, build, and push pipeline.
//!
//! Each stage runs one task per image concurrently. A failing image never
//! cancels its siblings: the stage waits for all of them and reports every
//! failure in one [`AggregateError`].

use crate::container::{
    AggregateError, BuildContext, BuildEvent, BuildRequest, BuildStepParser, ContainerError, Engine,
    ProcessState, ProgressTracker, RegistryAuth, ResourceKind, Result, ServiceDescriptor,
    StatusSender, TransferProgress,
};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Registry destination for pushed images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    /// Repository prefix, e.g. `us-docker.pkg.dev/project/repo`
    pub destination: String,
    /// Registry credentials
    pub auth: Option<RegistryAuth>,
}

impl PushTarget {
    /// Target `destination`, authenticating against its registry host with
    /// `token` when given.
    pub fn new(destination: impl Into<String>, token: Option<String>) -> Self {
        let destination = destination.into().trim_end_matches('/').to_string();
        let auth = token.filter(|t| !t.is_empty()).map(|token| RegistryAuth {
            server_address: destination
                .split('/')
                .next()
                .unwrap_or_default()
                .to_string(),
            token,
        });
        Self { destination, auth }
    }

    /// Reference `image` is pushed as.
    pub fn reference(&self, image: &str) -> String {
        format!("{}/{}", self.destination, image)
    }
}

/// Images that must be pulled for `services`: every image of a service
/// without a Dockerfile, found recursively through dependencies, each once.
pub fn collect_pull_targets(services: &[ServiceDescriptor]) -> Vec<String> {
    fn visit(service: &ServiceDescriptor, seen: &mut HashSet<String>, out: &mut Vec<String>) {
        if !service.is_built() && seen.insert(service.image.clone()) {
            out.push(service.image.clone());
        }
        for dependency in &service.dependencies {
            visit(dependency, seen, out);
        }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for service in services {
        visit(service, &mut seen, &mut out);
    }
    out
}

/// Sums per-layer transfer counters into one monotonic percentage.
///
/// Push updates carry no layer id, so their byte total stands in for it.
/// Layers that only appear after earlier ones completed cannot lower the
/// displayed value, which makes push progress a lower bound at best.
#[derive(Debug, Default)]
struct LayerProgress {
    layers: HashMap<String, (i64, i64)>,
    tracker: ProgressTracker,
}

impl LayerProgress {
    fn observe(&mut self, progress: &TransferProgress) -> Option<u8> {
        let (Some(current), Some(total)) = (progress.current, progress.total) else {
            return None;
        };
        let id = progress
            .id
            .clone()
            .unwrap_or_else(|| format!("size:{}", total));
        self.layers.insert(id, (current, total));

        let (current, total) = self
            .layers
            .values()
            .fold((0, 0), |(c, t), (lc, lt)| (c + lc, t + lt));
        self.tracker.observe(current, total)
    }
}

/// Pulls, builds, and pushes images for a set of services.
#[derive(Clone)]
pub struct ImagePipeline {
    engine: Arc<dyn Engine>,
    status: StatusSender,
}

impl ImagePipeline {
    /// Create a pipeline over `engine`, reporting to `status`.
    pub fn new(engine: Arc<dyn Engine>, status: StatusSender) -> Self {
        Self { engine, status }
    }

    /// Pull every image of `services` (and their dependencies) that is not
    /// present locally.
    ///
    /// # Errors
    ///
    /// Returns an aggregated error naming every image that failed.
    pub async fn pull_missing(&self, services: &[ServiceDescriptor]) -> Result<()> {
        let images = collect_pull_targets(services);
        debug!("Pull candidates: {:?}", images);

        let pulls = images.iter().map(|image| async move {
            let result = self.pull_one(image).await;
            (image.clone(), result)
        });
        AggregateError::collect(join_all(pulls).await)
    }

    async fn pull_one(&self, image: &str) -> Result<()> {
        if self.engine.image_exists(image).await? {
            debug!("Image {} already exists locally", image);
            return Ok(());
        }

        info!("Pulling image: {}", image);
        self.status
            .emit(ProcessState::initiating(ResourceKind::Image, image, "pulling"))
            .await;

        let mut progress = LayerProgress::default();
        let status = &self.status;
        let mut on_progress = |update: TransferProgress| {
            if let Some(percent) = progress.observe(&update) {
                status.try_emit(ProcessState::progress(
                    ResourceKind::Image,
                    image,
                    format!("pulling {}%", percent),
                ));
            }
        };

        let result = self.engine.pull_image(image, &mut on_progress).await;
        self.finish(ResourceKind::Image, image, "pulled", &result).await;
        result
    }

    /// Build the image of every service that has a Dockerfile.
    ///
    /// A pre-existing container with the service's name is removed first so
    /// the next start uses the new image.
    ///
    /// # Errors
    ///
    /// Returns an aggregated error naming every service whose build failed.
    pub async fn build_all(
        &self,
        services: &[ServiceDescriptor],
        context: &BuildContext,
    ) -> Result<()> {
        let builds = services
            .iter()
            .filter(|service| service.is_built())
            .map(|service| async move {
                let result = self.build_one(service, context).await;
                (service.name.clone(), result)
            });
        AggregateError::collect(join_all(builds).await)
    }

    async fn build_one(&self, service: &ServiceDescriptor, context: &BuildContext) -> Result<()> {
        let name = service.name.as_str();
        self.status
            .emit(ProcessState::initiating(ResourceKind::Image, name, "building"))
            .await;

        let result = self.build_image(service, context).await;
        self.finish(ResourceKind::Image, name, "built", &result).await;
        result
    }

    async fn build_image(&self, service: &ServiceDescriptor, context: &BuildContext) -> Result<()> {
        let Some(dockerfile) = &service.dockerfile else {
            return Ok(());
        };

        match self.engine.remove_container(&service.name).await {
            Ok(()) => debug!("Removed stale container {}", service.name),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let archive_context = context.clone();
        let content = dockerfile.content.clone();
        let archive = tokio::task::spawn_blocking(move || archive_context.archive(&content))
            .await
            .map_err(|e| ContainerError::Other(format!("Build context task failed: {}", e)))??;

        let request = BuildRequest {
            tag: service.image.clone(),
            target: dockerfile.target.clone(),
            platform: service.platform.clone(),
            context: archive,
            buildkit: self.engine.buildkit_supported(),
        };
        info!(
            "Building image {} for {} (target {})",
            request.tag, service.name, request.target
        );

        let mut parser = BuildStepParser::new();
        let status = &self.status;
        let name = service.name.as_str();
        let image = service.image.as_str();
        let mut on_event = |event: BuildEvent| match parser.observe(&event) {
            Ok(Some(step)) => {
                status.try_emit(ProcessState::progress(ResourceKind::Image, name, step));
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(reason) => Err(ContainerError::BuildFailed {
                image: image.to_string(),
                reason,
            }),
        };

        self.engine.build_image(request, &mut on_event).await
    }

    /// Tag every built image of `services` under the target and push it.
    ///
    /// # Errors
    ///
    /// Returns an aggregated error naming every image that failed.
    pub async fn push(&self, target: &PushTarget, services: &[ServiceDescriptor]) -> Result<()> {
        let pushes = services
            .iter()
            .filter(|service| service.is_built())
            .map(|service| async move {
                let result = self.push_one(target, &service.image).await;
                (service.image.clone(), result)
            });
        AggregateError::collect(join_all(pushes).await)
    }

    async fn push_one(&self, target: &PushTarget, image: &str) -> Result<()> {
        let reference = target.reference(image);
        self.status
            .emit(ProcessState::initiating(
                ResourceKind::Image,
                image,
                format!("pushing to {}", reference),
            ))
            .await;

        let result = self.tag_and_push(image, &reference, target).await;
        self.finish(ResourceKind::Image, image, "pushed", &result).await;
        result
    }

    async fn tag_and_push(&self, image: &str, reference: &str, target: &PushTarget) -> Result<()> {
        if !self.engine.image_exists(image).await? {
            return Err(ContainerError::PushFailed {
                image: image.to_string(),
                reason: "image does not exist locally".to_string(),
            });
        }

        self.engine.tag_image(image, reference).await?;

        let mut progress = LayerProgress::default();
        let status = &self.status;
        let mut on_progress = |update: TransferProgress| {
            if let Some(percent) = progress.observe(&update) {
                status.try_emit(ProcessState::progress(
                    ResourceKind::Image,
                    image,
                    format!("pushing {}%", percent),
                ));
            }
        };

        self.engine
            .push_image(reference, target.auth.as_ref(), &mut on_progress)
            .await?;
        info!("Pushed {} as {}", image, reference);
        Ok(())
    }

    async fn finish(&self, kind: ResourceKind, name: &str, done: &str, result: &Result<()>) {
        let state = match result {
            Ok(()) => ProcessState::succeeded(kind, name, done),
            Err(e) => ProcessState::failed(kind, name, e),
        };
        self.status.emit(state).await;
    }
}
