//! Command and notification contract between the session controller and the
//! typing engine.
//!
//! Over a process boundary each message is one JSON object per line, tagged by
//! `"type"`:
//!
//! ```text
//! {"type":"start","text":"hello","lowerDelay":50,"upperDelay":100}
//! {"type":"abort"}
//! {"type":"engine-started"}
//! {"type":"progress","progress":0.5,"timeLeftMs":4000}
//! {"type":"external-cancel"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One-shot commands issued to the typing engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineCommand {
    /// Stage `text` and wait for the start hotkey.
    #[serde(rename_all = "camelCase")]
    Start {
        text: String,
        lower_delay: u64,
        upper_delay: u64,
    },
    /// Stop whatever the engine is doing. Idempotent on the engine side.
    Abort,
}

impl EngineCommand {
    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::Start { .. } => "start",
            EngineCommand::Abort => "abort",
        }
    }
}

/// Notifications pushed by the typing engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineEvent {
    /// The start hotkey fired and injection has begun.
    EngineStarted,
    /// Fraction of the text typed so far plus an estimate of the time left.
    #[serde(rename_all = "camelCase")]
    Progress { progress: f64, time_left_ms: u64 },
    /// The cancel hotkey was observed inside the engine.
    ExternalCancel,
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::EngineStarted => EventKind::EngineStarted,
            EngineEvent::Progress { .. } => EventKind::Progress,
            EngineEvent::ExternalCancel => EventKind::ExternalCancel,
        }
    }
}

/// Discriminant of [`EngineEvent`], used as the subscription key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    EngineStarted,
    Progress,
    ExternalCancel,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::EngineStarted,
        EventKind::Progress,
        EventKind::ExternalCancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::EngineStarted => "engine-started",
            EventKind::Progress => "progress",
            EventKind::ExternalCancel => "external-cancel",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound half of an engine connection.
///
/// `send` only hands the command to the transport; it never waits for the
/// engine to act on it. An `Err` means the command could not be dispatched at
/// all (engine gone, pipe closed).
pub trait EngineLink: Send + Sync {
    fn send(&self, command: EngineCommand) -> Result<()>;
}

/// Encode a command as a single JSON line, without the trailing newline.
pub fn encode_command(command: &EngineCommand) -> Result<String> {
    Ok(serde_json::to_string(command)?)
}

/// Decode one line received from the engine.
pub fn decode_event(line: &str) -> Result<EngineEvent> {
    Ok(serde_json::from_str(line.trim())?)
}
