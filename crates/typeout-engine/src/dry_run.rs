//! In-process engine that follows the engine contract without injecting
//! keystrokes.
//!
//! After `start` it waits `start_wait` in place of the start hotkey, emits
//! `engine-started`, then reports progress once per character with a random
//! delay drawn from the requested bounds. Useful for rehearsing a run and for
//! exercising the session end to end.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use typeout_core::error::{Result, TypeoutError};
use typeout_core::protocol::{EngineCommand, EngineEvent, EngineLink};

use crate::EventSender;

/// Tuning for the dry-run engine.
#[derive(Debug, Clone, Copy)]
pub struct DryRunOptions {
    /// Simulated wait for the start hotkey.
    pub start_wait: Duration,
}

impl Default for DryRunOptions {
    fn default() -> Self {
        Self {
            start_wait: Duration::from_secs(1),
        }
    }
}

/// Command side of a running [`DryRunEngine`].
#[derive(Debug, Clone)]
pub struct DryRunLink {
    commands: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineLink for DryRunLink {
    fn send(&self, command: EngineCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| TypeoutError::EngineUnavailable("dry-run engine stopped".to_string()))
    }
}

pub struct DryRunEngine;

impl DryRunEngine {
    /// Start the engine task. It runs until every link clone is dropped.
    pub fn spawn(options: DryRunOptions, events: EventSender) -> (Arc<DryRunLink>, JoinHandle<()>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_engine(options, command_rx, events));
        info!(start_wait_ms = options.start_wait.as_millis() as u64, "Dry-run typing engine started");
        (Arc::new(DryRunLink { commands }), task)
    }
}

async fn run_engine(
    options: DryRunOptions,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
    events: EventSender,
) {
    let mut current: Option<JoinHandle<()>> = None;

    while let Some(command) = commands.recv().await {
        match command {
            EngineCommand::Start {
                text,
                lower_delay,
                upper_delay,
            } => {
                if let Some(run) = current.take() {
                    debug!("New start replaces the run in progress");
                    run.abort();
                }
                let (lower, upper) = if lower_delay <= upper_delay {
                    (lower_delay, upper_delay)
                } else {
                    warn!(lower_delay, upper_delay, "Delay bounds reversed, swapping");
                    (upper_delay, lower_delay)
                };
                current = Some(tokio::spawn(type_out(
                    text,
                    lower,
                    upper,
                    options.start_wait,
                    events.clone(),
                )));
            }
            EngineCommand::Abort => {
                if let Some(run) = current.take() {
                    run.abort();
                    debug!("Dry run aborted");
                }
            }
        }
    }

    if let Some(run) = current.take() {
        run.abort();
    }
    debug!("Dry-run engine stopped");
}

async fn type_out(text: String, lower: u64, upper: u64, start_wait: Duration, events: EventSender) {
    tokio::time::sleep(start_wait).await;
    if events.send(EngineEvent::EngineStarted).is_err() {
        return;
    }

    let total = text.chars().count();
    let mean_delay = lower.saturating_add(upper) / 2;

    if total == 0 {
        let _ = events.send(EngineEvent::Progress {
            progress: 1.0,
            time_left_ms: 0,
        });
        return;
    }

    for typed in 1..=total {
        let delay = rand::rng().random_range(lower..=upper);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        let remaining = (total - typed) as u64;
        let event = EngineEvent::Progress {
            progress: typed as f64 / total as f64,
            time_left_ms: remaining.saturating_mul(mean_delay),
        };
        if events.send(event).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn options() -> DryRunOptions {
        DryRunOptions {
            start_wait: Duration::from_millis(200),
        }
    }

    fn start(text: &str, lower: u64, upper: u64) -> EngineCommand {
        EngineCommand::Start {
            text: text.to_string(),
            lower_delay: lower,
            upper_delay: upper,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_started_then_progress_to_completion() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (link, _task) = DryRunEngine::spawn(options(), events_tx);

        link.send(start("abcd", 10, 30)).unwrap();

        assert_eq!(events_rx.recv().await, Some(EngineEvent::EngineStarted));
        let mut reports = Vec::new();
        for _ in 0..4 {
            match events_rx.recv().await {
                Some(EngineEvent::Progress {
                    progress,
                    time_left_ms,
                }) => reports.push((progress, time_left_ms)),
                other => panic!("Expected progress, got {:?}", other),
            }
        }

        assert_eq!(reports[0], (0.25, 60));
        assert_eq!(reports[1], (0.5, 40));
        assert_eq!(reports[3], (1.0, 0));
        assert!(reports.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_stops_the_run() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (link, _task) = DryRunEngine::spawn(options(), events_tx);

        link.send(start("a long piece of text", 100, 100)).unwrap();
        assert_eq!(events_rx.recv().await, Some(EngineEvent::EngineStarted));
        assert!(matches!(
            events_rx.recv().await,
            Some(EngineEvent::Progress { .. })
        ));

        link.send(EngineCommand::Abort).unwrap();
        assert!(timeout(Duration::from_secs(60), events_rx.recv())
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_while_waiting_for_start_key() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (link, _task) = DryRunEngine::spawn(options(), events_tx);

        link.send(start("abc", 1, 2)).unwrap();
        link.send(EngineCommand::Abort).unwrap();
        assert!(timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_without_run_is_noop() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (link, _task) = DryRunEngine::spawn(options(), events_tx);

        link.send(EngineCommand::Abort).unwrap();
        link.send(start("x", 5, 5)).unwrap();
        assert_eq!(events_rx.recv().await, Some(EngineEvent::EngineStarted));
        assert_eq!(
            events_rx.recv().await,
            Some(EngineEvent::Progress {
                progress: 1.0,
                time_left_ms: 0
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reversed_bounds_are_swapped() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (link, _task) = DryRunEngine::spawn(options(), events_tx);

        link.send(start("xy", 40, 20)).unwrap();
        assert_eq!(events_rx.recv().await, Some(EngineEvent::EngineStarted));
        assert_eq!(
            events_rx.recv().await,
            Some(EngineEvent::Progress {
                progress: 0.5,
                time_left_ms: 30
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_fails_after_engine_stops() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (link, task) = DryRunEngine::spawn(options(), events_tx);

        task.abort();
        let _ = task.await;
        assert!(matches!(
            link.send(EngineCommand::Abort),
            Err(TypeoutError::EngineUnavailable(_))
        ));
    }
}
