//! Typeout core crate - shared types for the session, engine and app crates.
//!
//! Holds the error type, the TOML application config, the persisted user
//! settings with their store, and the engine wire protocol: the commands sent
//! to a typing engine, the notifications it emits, and the [`EngineLink`]
//! trait every engine connection implements.

pub mod config;
pub mod error;
pub mod protocol;
pub mod settings;

pub use config::AppConfig;
pub use error::{Result, TypeoutError};
pub use protocol::{EngineCommand, EngineEvent, EngineLink, EventKind};
pub use settings::{Settings, SettingsPatch, SettingsStore};
