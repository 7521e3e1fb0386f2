//! Plain line rendering of process state events.

use crate::container::{Phase, ProcessState};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Format one event as a single status line.
pub fn format_state(state: &ProcessState) -> String {
    let marker = match (state.phase, &state.error) {
        (Phase::Finished, Some(_)) => "✗",
        (Phase::Finished, None) => "✓",
        (Phase::InProgress, _) => "…",
        (Phase::Initiating, _) => "→",
    };

    let detail = state
        .error
        .as_deref()
        .or(state.detail.as_deref())
        .unwrap_or_default();
    format!("{} {} {}: {}", marker, state.kind, state.name, detail)
}

/// Print every event from `rx` until all senders are gone.
///
/// Failures go to stderr, everything else to stdout.
pub fn spawn_printer(mut rx: mpsc::Receiver<ProcessState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(state) = rx.recv().await {
            let line = format_state(&state);
            if state.is_failure() {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ResourceKind, StatusSender};

    #[test]
    fn test_format_state() {
        let started = ProcessState::initiating(ResourceKind::Container, "game-redis", "starting");
        assert_eq!(format_state(&started), "→ container game-redis: starting");

        let failed = ProcessState::failed(ResourceKind::Image, "game-cardinal", &"disk full");
        assert_eq!(format_state(&failed), "✗ image game-cardinal: disk full");

        let done = ProcessState::succeeded(ResourceKind::Network, "game", "network created");
        assert_eq!(format_state(&done), "✓ network game: network created");
    }

    #[tokio::test]
    async fn test_printer_ends_with_senders() {
        let (sender, rx) = StatusSender::channel(4);
        let printer = spawn_printer(rx);
        sender
            .emit(ProcessState::progress(ResourceKind::Image, "redis", "pulling 10%"))
            .await;
        drop(sender);
        printer.await.unwrap();
    }
}
