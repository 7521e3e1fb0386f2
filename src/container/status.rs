//! Process state events for the display sink.
//!
//! Every lifecycle operation reports its progress as [`ProcessState`] events
//! on a bounded channel. The sink decides how to render them; the engine only
//! guarantees each resource gets an initiating event and exactly one terminal
//! event per operation.

use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

/// Kind of resource a [`ProcessState`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Container,
    Image,
    Network,
    Volume,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Container => write!(f, "container"),
            ResourceKind::Image => write!(f, "image"),
            ResourceKind::Network => write!(f, "network"),
            ResourceKind::Volume => write!(f, "volume"),
        }
    }
}

/// Phase of an operation on one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initiating,
    InProgress,
    Finished,
}

/// A status update for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessState {
    /// Service, image, network, or volume name
    pub name: String,
    /// Kind of resource
    pub kind: ResourceKind,
    /// Operation phase
    pub phase: Phase,
    /// Human-readable detail (action, build step, progress)
    pub detail: Option<String>,
    /// Error message for a failed operation
    pub error: Option<String>,
    /// Whether this is the last event for the operation
    pub done: bool,
}

impl ProcessState {
    /// An operation is starting.
    pub fn initiating(kind: ResourceKind, name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            phase: Phase::Initiating,
            detail: Some(detail.into()),
            error: None,
            done: false,
        }
    }

    /// An operation made progress.
    pub fn progress(kind: ResourceKind, name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            phase: Phase::InProgress,
            detail: Some(detail.into()),
            error: None,
            done: false,
        }
    }

    /// An operation succeeded.
    pub fn succeeded(kind: ResourceKind, name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            phase: Phase::Finished,
            detail: Some(detail.into()),
            error: None,
            done: true,
        }
    }

    /// An operation failed.
    pub fn failed(kind: ResourceKind, name: &str, error: &dyn fmt::Display) -> Self {
        Self {
            name: name.to_string(),
            kind,
            phase: Phase::Finished,
            detail: None,
            error: Some(error.to_string()),
            done: true,
        }
    }

    /// Whether this is a terminal failure event.
    pub fn is_failure(&self) -> bool {
        self.done && self.error.is_some()
    }
}

/// Sending half of the display sink.
///
/// Initiating and terminal events wait for channel capacity; progress events
/// are dropped when the channel is full since a later one supersedes them.
/// A closed or disabled sink silently discards events.
#[derive(Debug, Clone, Default)]
pub struct StatusSender {
    tx: Option<mpsc::Sender<ProcessState>>,
}

impl StatusSender {
    /// Create a sink with room for `capacity` buffered events.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProcessState>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event.
    pub async fn emit(&self, state: ProcessState) {
        let Some(tx) = &self.tx else {
            return;
        };

        if state.phase == Phase::InProgress {
            self.try_emit(state);
            return;
        }

        if tx.send(state).await.is_err() {
            debug!("Display sink closed");
        }
    }

    /// Emit an event without waiting, dropping it when the channel is full.
    ///
    /// Used from synchronous progress callbacks.
    pub fn try_emit(&self, state: ProcessState) {
        let Some(tx) = &self.tx else {
            return;
        };

        if let Err(mpsc::error::TrySendError::Full(state)) = tx.try_send(state) {
            debug!("Display sink full, dropping update for {}", state.name);
        }
    }
}

/// Tracks transfer progress so the displayed percentage never goes backwards.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    percent: Option<u8>,
}

impl ProgressTracker {
    /// Create a tracker with nothing reported yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `current/total` byte count and return the percentage to display.
    ///
    /// Returns `None` when the counters carry no usable ratio.
    pub fn observe(&mut self, current: i64, total: i64) -> Option<u8> {
        if total <= 0 || current < 0 {
            return self.percent;
        }

        let percent = ((current.min(total) as f64 / total as f64) * 100.0).floor() as u8;
        let displayed = self.percent.map_or(percent, |previous| previous.max(percent));
        self.percent = Some(displayed);
        Some(displayed)
    }

    /// Last displayed percentage.
    pub fn percent(&self) -> Option<u8> {
        self.percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_never_regresses() {
        let mut tracker = ProgressTracker::new();
        let shown: Vec<u8> = [(10, 100), (5, 100), (50, 100), (100, 100)]
            .into_iter()
            .filter_map(|(current, total)| tracker.observe(current, total))
            .collect();
        assert_eq!(shown, vec![10, 10, 50, 100]);
    }

    #[test]
    fn test_progress_ignores_unknown_totals() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.observe(10, 0), None);
        assert_eq!(tracker.observe(30, 60), Some(50));
        assert_eq!(tracker.observe(10, -1), Some(50));
        assert_eq!(tracker.observe(90, 60), Some(100));
    }

    #[tokio::test]
    async fn test_sender_delivers_terminal_events() {
        let (sender, mut rx) = StatusSender::channel(2);
        sender
            .emit(ProcessState::initiating(ResourceKind::Container, "a", "starting"))
            .await;
        sender
            .emit(ProcessState::failed(ResourceKind::Container, "a", &"boom"))
            .await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.phase, Phase::Initiating);
        let last = rx.recv().await.unwrap();
        assert!(last.is_failure());
        assert_eq!(last.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_progress_dropped_when_full() {
        let (sender, mut rx) = StatusSender::channel(1);
        sender
            .emit(ProcessState::progress(ResourceKind::Image, "redis", "10%"))
            .await;
        sender
            .emit(ProcessState::progress(ResourceKind::Image, "redis", "20%"))
            .await;

        assert_eq!(rx.recv().await.unwrap().detail.as_deref(), Some("10%"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disabled_sender_discards() {
        StatusSender::disabled()
            .emit(ProcessState::succeeded(ResourceKind::Volume, "v", "created"))
            .await;
    }
}
