//! Mutable state of the single typing session.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::stage::Stage;

/// Identity and timing of one run, from `start` until the session returns to
/// Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunInfo {
    /// Unique identifier for log correlation.
    pub id: Uuid,
    /// When the start command was issued.
    pub started_at: DateTime<Utc>,
}

impl RunInfo {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    /// Seconds since the start command was issued.
    pub fn elapsed_secs(&self) -> f64 {
        let elapsed = Utc::now() - self.started_at;
        elapsed.num_milliseconds() as f64 / 1000.0
    }
}

impl Default for RunInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// The session owned by [`crate::SessionController`].
///
/// Fields are only written from inside the controller's transition methods.
#[derive(Debug, Clone, Default)]
pub(crate) struct Session {
    pub stage: Stage,
    pub text: String,
    pub progress: f64,
    pub time_left_ms: u64,
    pub run: Option<RunInfo>,
}

impl Session {
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            stage: self.stage,
            text: self.text.clone(),
            progress: self.progress,
            time_left_ms: self.time_left_ms,
            run_id: self.run.map(|r| r.id),
        }
    }

    /// Forget progress from a previous run.
    pub fn clear_progress(&mut self) {
        self.progress = 0.0;
        self.time_left_ms = 0;
    }
}

/// Immutable copy of the session published after every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub stage: Stage,
    /// The staged text.
    pub text: String,
    /// Fraction typed, in `[0, 1]`. Meaningful in Typing and Finished.
    pub progress: f64,
    /// Estimated milliseconds left. Meaningful in Typing.
    pub time_left_ms: u64,
    /// Current run, if one was started since the last return to Idle.
    pub run_id: Option<Uuid>,
}

impl SessionSnapshot {
    pub fn locked(&self) -> bool {
        self.stage.is_locked()
    }
}
