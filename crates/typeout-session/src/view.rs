//! What the front end shows for a given snapshot.

use std::fmt;

use crate::format::format_duration;
use crate::session::SessionSnapshot;
use crate::stage::Stage;

/// Status area below the start/cancel buttons.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    /// Nothing shown while idle.
    Empty,
    /// Waiting for the start hotkey.
    Watching { start_key: String },
    /// Typing in progress.
    Typing {
        progress: f64,
        percent: u8,
        time_left: String,
    },
    Finished,
    Cancelled,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Empty => Ok(()),
            Status::Watching { start_key } => {
                write!(f, "watching for start key ({})", start_key)
            }
            Status::Typing {
                progress,
                percent,
                time_left,
            } => write!(
                f,
                "{} {}% time left: {}",
                progress_bar(*progress, 20),
                percent,
                time_left
            ),
            Status::Finished => write!(f, "finished typing"),
            Status::Cancelled => write!(f, "typing aborted"),
        }
    }
}

/// Derived, render-ready state. Text, settings and navigation are gated by
/// `locked`; start additionally needs an Idle session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub locked: bool,
    pub text_editable: bool,
    pub settings_editable: bool,
    pub navigation_enabled: bool,
    pub start_enabled: bool,
    pub cancel_enabled: bool,
    pub status: Status,
}

impl SessionView {
    pub fn new(snapshot: &SessionSnapshot, start_key: &str) -> Self {
        let locked = snapshot.locked();
        let has_text = !snapshot.text.is_empty();

        let status = match snapshot.stage {
            Stage::Idle => Status::Empty,
            Stage::Watching => Status::Watching {
                start_key: start_key.to_string(),
            },
            Stage::Typing => Status::Typing {
                progress: snapshot.progress,
                percent: (snapshot.progress * 100.0).round().clamp(0.0, 100.0) as u8,
                time_left: format_duration(snapshot.time_left_ms),
            },
            Stage::Finished => Status::Finished,
            Stage::Cancelled => Status::Cancelled,
        };

        Self {
            locked,
            text_editable: !locked,
            settings_editable: !locked,
            navigation_enabled: !locked,
            start_enabled: has_text && snapshot.stage == Stage::Idle,
            cancel_enabled: has_text && locked,
            status,
        }
    }
}

/// Fixed-width text progress bar, e.g. `[#####-----]`.
pub fn progress_bar(fraction: f64, width: usize) -> String {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = ((fraction * width as f64).floor() as usize).min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}
