//! Lifecycle stages of a typing run.
//!
//! Valid transitions:
//! - Idle -> Watching (start command issued)
//! - Watching -> Typing (engine saw the start hotkey)
//! - Typing -> Finished (final progress report)
//! - Watching | Typing -> Cancelled (user cancel or cancel hotkey)
//! - Watching -> Idle (start command could not be dispatched)
//! - Finished | Cancelled -> Idle (fresh run)

use std::fmt;

use typeout_core::error::{Result, TypeoutError};

/// Discrete stage of one typing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Nothing in flight. Text and settings are editable.
    #[default]
    Idle,
    /// The engine holds the text and waits for the start hotkey.
    Watching,
    /// The engine is injecting keystrokes.
    Typing,
    /// Every character was typed.
    Finished,
    /// The run was stopped by the user or the cancel hotkey.
    Cancelled,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => write!(f, "Idle"),
            Stage::Watching => write!(f, "Watching"),
            Stage::Typing => write!(f, "Typing"),
            Stage::Finished => write!(f, "Finished"),
            Stage::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl Stage {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &Stage) -> bool {
        matches!(
            (self, target),
            (Stage::Idle, Stage::Watching)
                | (Stage::Watching, Stage::Typing)
                | (Stage::Typing, Stage::Finished)
                // Cancel transitions
                | (Stage::Watching, Stage::Cancelled)
                | (Stage::Typing, Stage::Cancelled)
                // Dispatch rollback
                | (Stage::Watching, Stage::Idle)
                // Fresh run
                | (Stage::Finished, Stage::Idle)
                | (Stage::Cancelled, Stage::Idle)
        )
    }

    /// A run is in flight: inputs must be disabled and only cancel is offered.
    pub fn is_locked(&self) -> bool {
        matches!(self, Stage::Watching | Stage::Typing)
    }

    /// The run ended, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Finished | Stage::Cancelled)
    }

    /// Validate a transition, returning the new stage.
    pub fn transition(self, target: Stage) -> Result<Stage> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(TypeoutError::Session(format!(
                "Invalid stage transition: {} -> {}",
                self, target
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Stage; 5] = [
        Stage::Idle,
        Stage::Watching,
        Stage::Typing,
        Stage::Finished,
        Stage::Cancelled,
    ];

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Idle.to_string(), "Idle");
        assert_eq!(Stage::Watching.to_string(), "Watching");
        assert_eq!(Stage::Typing.to_string(), "Typing");
        assert_eq!(Stage::Finished.to_string(), "Finished");
        assert_eq!(Stage::Cancelled.to_string(), "Cancelled");
    }

    #[test]
    fn test_valid_transitions() {
        assert!(Stage::Idle.can_transition_to(&Stage::Watching));
        assert!(Stage::Watching.can_transition_to(&Stage::Typing));
        assert!(Stage::Typing.can_transition_to(&Stage::Finished));
        assert!(Stage::Watching.can_transition_to(&Stage::Cancelled));
        assert!(Stage::Typing.can_transition_to(&Stage::Cancelled));
        assert!(Stage::Watching.can_transition_to(&Stage::Idle));
        assert!(Stage::Finished.can_transition_to(&Stage::Idle));
        assert!(Stage::Cancelled.can_transition_to(&Stage::Idle));
    }

    #[test]
    fn test_invalid_transitions() {
        // Cannot skip the watching phase
        assert!(!Stage::Idle.can_transition_to(&Stage::Typing));
        assert!(!Stage::Watching.can_transition_to(&Stage::Finished));

        // Terminal stages never flip into each other
        assert!(!Stage::Finished.can_transition_to(&Stage::Cancelled));
        assert!(!Stage::Cancelled.can_transition_to(&Stage::Finished));

        // Nothing to cancel while idle
        assert!(!Stage::Idle.can_transition_to(&Stage::Cancelled));

        // No self transitions
        for stage in ALL {
            assert!(!stage.can_transition_to(&stage), "{stage} -> {stage}");
        }
    }

    #[test]
    fn test_locked_iff_watching_or_typing() {
        for stage in ALL {
            let expected = stage == Stage::Watching || stage == Stage::Typing;
            assert_eq!(stage.is_locked(), expected, "{stage}");
        }
    }

    #[test]
    fn test_terminal_stages() {
        assert!(Stage::Finished.is_terminal());
        assert!(Stage::Cancelled.is_terminal());
        assert!(!Stage::Idle.is_terminal());
        assert!(!Stage::Typing.is_terminal());
    }

    #[test]
    fn test_transition_error_message() {
        match Stage::Finished.transition(Stage::Cancelled) {
            Err(TypeoutError::Session(msg)) => {
                assert!(msg.contains("Finished"));
                assert!(msg.contains("Cancelled"));
            }
            other => panic!("Expected Session error, got {:?}", other),
        }
        assert_eq!(Stage::Idle.transition(Stage::Watching).unwrap(), Stage::Watching);
    }
}
