//! Typeout engine crate - connections to the out-of-process typing engine.
//!
//! Every link implements [`typeout_core::EngineLink`] for outbound commands
//! and pushes inbound [`typeout_core::EngineEvent`]s into an unbounded channel
//! that the front end drains into its event hub.
//!
//! - [`ProcessEngine`]: child process speaking JSON lines on stdin/stdout.
//! - [`DryRunEngine`]: in-process engine that reports progress on a simulated
//!   schedule without touching the keyboard.

pub mod dry_run;
pub mod process;

pub use dry_run::{DryRunEngine, DryRunOptions};
pub use process::{ProcessEngine, ProcessLink};

/// Sender half used by links to deliver engine notifications.
pub type EventSender = tokio::sync::mpsc::UnboundedSender<typeout_core::EngineEvent>;
