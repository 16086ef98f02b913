//! Typeout session crate - the typing-run state machine and its event bridge.
//!
//! A run moves Idle -> Watching -> Typing -> Finished, with Watching and
//! Typing able to branch to Cancelled. The [`SessionController`] is the single
//! writer of session state; the [`EventBridge`] turns engine notifications
//! into controller transitions and readers follow a `watch` snapshot channel.

pub mod bridge;
pub mod controller;
pub mod format;
pub mod session;
pub mod stage;
pub mod view;

pub use bridge::{EventBridge, EventHub, Subscription};
pub use controller::{IgnoreReason, Outcome, SessionController};
pub use format::format_duration;
pub use session::{RunInfo, SessionSnapshot};
pub use stage::Stage;
pub use view::{SessionView, Status};
