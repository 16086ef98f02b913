//! The session state machine.
//!
//! `SessionController` is the only writer of the [`Session`]. User triggers
//! (`start`, `cancel`, text edits) and engine notifications (`engine_started`,
//! `progress`, `external_cancel`) all go through it. Each trigger takes the
//! session lock once, so the guard check and the write are atomic, then
//! publishes a [`SessionSnapshot`] for readers.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use typeout_core::error::Result;
use typeout_core::protocol::{EngineCommand, EngineLink};
use typeout_core::settings::{SettingsPatch, SettingsStore};

use crate::session::{RunInfo, Session, SessionSnapshot};
use crate::stage::Stage;

/// Why a trigger left the session untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// `start` with nothing staged.
    EmptyText,
    /// `start` with the lower delay bound above the upper one.
    InvalidDelayRange { lower: u64, upper: u64 },
    /// The trigger does not apply in the current stage.
    WrongStage(Stage),
    /// Editing attempted while a run is in flight.
    Locked,
    /// Progress value was NaN or infinite.
    InvalidProgress,
}

/// Result of applying one trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The stage changed.
    Transitioned { from: Stage, to: Stage },
    /// Values changed, the stage did not.
    Updated,
    /// Nothing changed and no command was sent.
    Ignored(IgnoreReason),
}

impl Outcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Outcome::Ignored(_))
    }
}

struct Inner {
    session: Mutex<Session>,
    /// Serializes engine command dispatch so a `cancel` cannot overtake the
    /// `start` it cancels. Never taken by engine notifications.
    dispatch: Mutex<()>,
    engine: Arc<dyn EngineLink>,
    settings: SettingsStore,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

/// Handle to the session state machine. Clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("session", &*self.lock())
            .field("settings", &self.inner.settings.get())
            .finish()
    }
}

impl SessionController {
    /// Create a controller in the Idle stage with no staged text.
    pub fn new(engine: Arc<dyn EngineLink>, settings: SettingsStore) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                session: Mutex::new(Session::default()),
                dispatch: Mutex::new(()),
                engine,
                settings,
                snapshot_tx,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_dispatch(&self) -> MutexGuard<'_, ()> {
        self.inner
            .dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, session: &Session) {
        self.inner.snapshot_tx.send_replace(session.snapshot());
    }

    pub fn stage(&self) -> Stage {
        self.lock().stage
    }

    /// True while a run is in flight (Watching or Typing).
    pub fn locked(&self) -> bool {
        self.lock().stage.is_locked()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    /// Receive a fresh snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.inner.settings
    }

    // =========================================================================
    // User triggers
    // =========================================================================

    /// Replace the staged text.
    ///
    /// Ignored while locked. Editing after a finished or cancelled run starts
    /// over from Idle.
    pub fn set_text(&self, text: impl Into<String>) -> Outcome {
        let mut session = self.lock();
        let from = session.stage;
        if from.is_locked() {
            debug!(stage = %from, "Text edit ignored while locked");
            return Outcome::Ignored(IgnoreReason::Locked);
        }

        let outcome = if from.is_terminal() {
            session.stage = Stage::Idle;
            session.run = None;
            session.clear_progress();
            Outcome::Transitioned {
                from,
                to: Stage::Idle,
            }
        } else {
            Outcome::Updated
        };
        session.text = text.into();
        self.publish(&session);
        outcome
    }

    pub fn clear_text(&self) -> Outcome {
        self.set_text(String::new())
    }

    /// Return from Finished or Cancelled to Idle, keeping the staged text.
    pub fn reset(&self) -> Outcome {
        let mut session = self.lock();
        let from = session.stage;
        if !from.is_terminal() {
            let reason = if from.is_locked() {
                IgnoreReason::Locked
            } else {
                IgnoreReason::WrongStage(from)
            };
            return Outcome::Ignored(reason);
        }

        session.stage = Stage::Idle;
        session.run = None;
        session.clear_progress();
        self.publish(&session);
        Outcome::Transitioned {
            from,
            to: Stage::Idle,
        }
    }

    /// Apply a settings change unless a run is in flight.
    pub fn update_settings(&self, patch: SettingsPatch) -> Outcome {
        // `start` reads the bounds under this lock, so it sees either the old
        // or the new settings as a whole.
        let session = self.lock();
        if session.stage.is_locked() {
            debug!(stage = %session.stage, "Settings edit ignored while locked");
            return Outcome::Ignored(IgnoreReason::Locked);
        }
        self.inner.settings.set(patch);
        Outcome::Updated
    }

    /// Hand the staged text to the engine and start watching for the hotkey.
    ///
    /// The stage moves to Watching before the command is dispatched. If the
    /// dispatch fails the stage is rolled back to Idle and the error returned.
    pub fn start(&self) -> Result<Outcome> {
        let _dispatch = self.lock_dispatch();

        let (command, run, lower, upper) = {
            let mut session = self.lock();
            // Read under the session lock, which `update_settings` also holds.
            let settings = self.inner.settings.get();
            let lower = settings.lower_delay_bound;
            let upper = settings.upper_delay_bound;

            if session.stage != Stage::Idle {
                debug!(stage = %session.stage, "Start ignored outside Idle");
                return Ok(Outcome::Ignored(IgnoreReason::WrongStage(session.stage)));
            }
            if session.text.is_empty() {
                debug!("Start ignored with no staged text");
                return Ok(Outcome::Ignored(IgnoreReason::EmptyText));
            }
            if lower > upper {
                warn!(lower, upper, "Start ignored: lower delay bound exceeds upper");
                return Ok(Outcome::Ignored(IgnoreReason::InvalidDelayRange {
                    lower,
                    upper,
                }));
            }

            let run = RunInfo::new();
            session.stage = Stage::Watching;
            session.run = Some(run);
            session.clear_progress();
            self.publish(&session);

            let command = EngineCommand::Start {
                text: session.text.clone(),
                lower_delay: lower,
                upper_delay: upper,
            };
            (command, run, lower, upper)
        };

        info!(
            run_id = %run.id,
            lower_delay = lower,
            upper_delay = upper,
            "Typing run started, watching for start key"
        );

        // Dispatched outside the session lock so a link that answers
        // synchronously can re-enter the controller.
        if let Err(e) = self.inner.engine.send(command) {
            warn!(run_id = %run.id, error = %e, "Start command dispatch failed, back to Idle");
            let mut session = self.lock();
            if session.stage == Stage::Watching && session.run.map(|r| r.id) == Some(run.id) {
                session.stage = Stage::Idle;
                session.run = None;
                self.publish(&session);
            }
            return Err(e);
        }

        Ok(Outcome::Transitioned {
            from: Stage::Idle,
            to: Stage::Watching,
        })
    }

    /// Cancel the run and tell the engine to abort.
    ///
    /// The stage flips to Cancelled immediately; the abort is not awaited and
    /// a dispatch failure is only logged.
    pub fn cancel(&self) -> Outcome {
        let _dispatch = self.lock_dispatch();
        let outcome = self.advance(Stage::Cancelled, "cancel");
        if let Outcome::Transitioned { .. } = outcome {
            if let Err(e) = self.inner.engine.send(EngineCommand::Abort) {
                warn!(error = %e, "Abort command dispatch failed");
            }
        }
        outcome
    }

    // =========================================================================
    // Engine notifications
    // =========================================================================

    /// The engine saw the start hotkey and began typing.
    pub fn engine_started(&self) -> Outcome {
        self.advance(Stage::Typing, "engine-started")
    }

    /// The cancel hotkey fired inside the engine, which already stopped.
    ///
    /// Only applies to an active run; Idle and terminal stages stay put.
    pub fn external_cancel(&self) -> Outcome {
        self.advance(Stage::Cancelled, "external-cancel")
    }

    /// Record a progress report.
    ///
    /// Only accepted while Typing. A value of 1 finishes the run in the same
    /// update, so no snapshot ever shows full progress while still Typing.
    pub fn progress(&self, progress: f64, time_left_ms: u64) -> Outcome {
        if !progress.is_finite() {
            debug!(progress, "Ignoring non-finite progress");
            return Outcome::Ignored(IgnoreReason::InvalidProgress);
        }
        let progress = progress.clamp(0.0, 1.0);

        let mut session = self.lock();
        if session.stage != Stage::Typing {
            debug!(stage = %session.stage, progress, "Ignoring stale progress");
            return Outcome::Ignored(IgnoreReason::WrongStage(session.stage));
        }

        session.progress = progress;
        session.time_left_ms = time_left_ms;

        if progress >= 1.0 {
            session.stage = Stage::Finished;
            session.time_left_ms = 0;
            self.publish(&session);
            if let Some(run) = session.run {
                info!(
                    run_id = %run.id,
                    elapsed_secs = run.elapsed_secs(),
                    "Typing run finished"
                );
            }
            return Outcome::Transitioned {
                from: Stage::Typing,
                to: Stage::Finished,
            };
        }

        self.publish(&session);
        Outcome::Updated
    }

    fn advance(&self, target: Stage, trigger: &'static str) -> Outcome {
        let mut session = self.lock();
        let from = session.stage;
        match from.transition(target) {
            Ok(to) => {
                session.stage = to;
                self.publish(&session);
                let run_id = session.run.map(|r| r.id.to_string()).unwrap_or_default();
                debug!(%run_id, trigger, "Session stage: {} -> {}", from, to);
                Outcome::Transitioned { from, to }
            }
            Err(_) => {
                debug!(trigger, stage = %from, "Trigger ignored in current stage");
                Outcome::Ignored(IgnoreReason::WrongStage(from))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
