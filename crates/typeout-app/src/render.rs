//! Line-oriented rendering of session snapshots to stdout.

use typeout_core::Settings;
use typeout_session::{IgnoreReason, SessionSnapshot, SessionView, Stage, Status};

/// Prints one line per visible change. Typing progress is only reprinted
/// when the whole percentage moves.
pub struct Renderer {
    start_key: String,
    cancel_key: String,
    last: Option<(Stage, Option<u8>, bool)>,
}

impl Renderer {
    pub fn new(start_key: impl Into<String>, cancel_key: impl Into<String>) -> Self {
        Self {
            start_key: start_key.into(),
            cancel_key: cancel_key.into(),
            last: None,
        }
    }

    /// Line to print for `snapshot`, or `None` if nothing visible changed.
    pub fn line_for(&mut self, snapshot: &SessionSnapshot) -> Option<String> {
        let view = SessionView::new(snapshot, &self.start_key);
        let percent = match &view.status {
            Status::Typing { percent, .. } => Some(*percent),
            _ => None,
        };
        let key = (snapshot.stage, percent, view.start_enabled);
        if self.last == Some(key) {
            return None;
        }
        self.last = Some(key);
        Some(self.describe(&view))
    }

    pub fn render(&mut self, snapshot: &SessionSnapshot) {
        if let Some(line) = self.line_for(snapshot) {
            println!("{}", line);
        }
    }

    fn describe(&self, view: &SessionView) -> String {
        match &view.status {
            Status::Empty if view.start_enabled => "ready: 'start' to arm".to_string(),
            Status::Empty => "idle: stage some text with 'text' or 'load'".to_string(),
            Status::Watching { .. } => format!("{} ('cancel' or {} to abort)", view.status, self.cancel_key),
            Status::Finished | Status::Cancelled => {
                format!("{} ('reset' or new text to run again)", view.status)
            }
            status => status.to_string(),
        }
    }
}

/// Human-readable reason a trigger was ignored.
pub fn describe_ignored(reason: IgnoreReason) -> String {
    match reason {
        IgnoreReason::EmptyText => "nothing to type, stage some text first".to_string(),
        IgnoreReason::InvalidDelayRange { lower, upper } => format!(
            "lower delay ({} ms) is above upper delay ({} ms)",
            lower, upper
        ),
        IgnoreReason::WrongStage(stage) => format!("not available while {}", stage),
        IgnoreReason::Locked => "locked while a run is active".to_string(),
        IgnoreReason::InvalidProgress => "invalid progress value".to_string(),
    }
}

pub fn describe_settings(settings: &Settings) -> String {
    format!(
        "delay {}..{} ms, delete text after completion: {}",
        settings.lower_delay_bound,
        settings.upper_delay_bound,
        if settings.delete_text_after_completion { "on" } else { "off" }
    )
}
