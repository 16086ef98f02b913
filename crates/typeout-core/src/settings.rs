//! User preferences that outlive a single typing run.
//!
//! The store keeps the in-memory value authoritative and hands every change
//! to an optional persistence channel; a background task (see
//! [`run_persistence`]) writes the record to disk.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, TypeoutError};

/// Schema version written to the settings file.
pub const SETTINGS_SCHEMA_VERSION: u32 = 1;

/// Delay bounds and post-completion behaviour.
///
/// No cross-field validation happens here; `lower_delay_bound` greater than
/// `upper_delay_bound` is stored as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Minimum delay between keystrokes, in milliseconds.
    pub lower_delay_bound: u64,
    /// Maximum delay between keystrokes, in milliseconds.
    pub upper_delay_bound: u64,
    /// Clear the staged text once a run finishes.
    pub delete_text_after_completion: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lower_delay_bound: 50,
            upper_delay_bound: 100,
            delete_text_after_completion: false,
        }
    }
}

/// A partial update. `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub lower_delay_bound: Option<u64>,
    pub upper_delay_bound: Option<u64>,
    pub delete_text_after_completion: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.lower_delay_bound.is_none()
            && self.upper_delay_bound.is_none()
            && self.delete_text_after_completion.is_none()
    }
}

impl Settings {
    /// Returns a copy with `patch` applied.
    pub fn apply(mut self, patch: SettingsPatch) -> Self {
        if let Some(lower) = patch.lower_delay_bound {
            self.lower_delay_bound = lower;
        }
        if let Some(upper) = patch.upper_delay_bound {
            self.upper_delay_bound = upper;
        }
        if let Some(delete) = patch.delete_text_after_completion {
            self.delete_text_after_completion = delete;
        }
        self
    }

    /// Load settings from a TOML file, migrating older schema versions.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_toml(&content)?;
        info!("Settings loaded from {}", path.display());
        Ok(settings)
    }

    /// Load settings, falling back to defaults when the file is missing or
    /// unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(TypeoutError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!(
                    "Failed to load settings from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        let record = SettingsRecord {
            schema_version: SETTINGS_SCHEMA_VERSION,
            settings: *self,
        };
        Ok(toml::to_string_pretty(&record)?)
    }

    /// Parse a settings record of any supported schema version.
    pub fn from_toml(content: &str) -> Result<Self> {
        let value: toml::Value = toml::from_str(content)?;
        let version = match value.get("schema_version") {
            None => 0,
            Some(v) => v
                .as_integer()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    TypeoutError::Config(format!("Invalid settings schema_version: {}", v))
                })?,
        };

        match version {
            0 => {
                let legacy: SettingsV0 = value.try_into()?;
                debug!("Migrating settings from schema version 0");
                Ok(legacy.into())
            }
            SETTINGS_SCHEMA_VERSION => {
                let record: SettingsRecord = value.try_into()?;
                Ok(record.settings)
            }
            newer => Err(TypeoutError::Config(format!(
                "Settings schema version {} is newer than supported version {}",
                newer, SETTINGS_SCHEMA_VERSION
            ))),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SettingsRecord {
    schema_version: u32,
    #[serde(flatten)]
    settings: Settings,
}

/// Unversioned layout, which named the bounds `lower_delay` / `upper_delay`.
#[derive(Deserialize)]
#[serde(default)]
struct SettingsV0 {
    lower_delay: u64,
    upper_delay: u64,
    delete_text_after_completion: bool,
}

impl Default for SettingsV0 {
    fn default() -> Self {
        let defaults = Settings::default();
        Self {
            lower_delay: defaults.lower_delay_bound,
            upper_delay: defaults.upper_delay_bound,
            delete_text_after_completion: defaults.delete_text_after_completion,
        }
    }
}

impl From<SettingsV0> for Settings {
    fn from(v0: SettingsV0) -> Self {
        Self {
            lower_delay_bound: v0.lower_delay,
            upper_delay_bound: v0.upper_delay,
            delete_text_after_completion: v0.delete_text_after_completion,
        }
    }
}

/// In-memory settings with asynchronous write-behind persistence.
///
/// Clones share the same value.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    current: Arc<Mutex<Settings>>,
    persist_tx: Option<mpsc::UnboundedSender<Settings>>,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl SettingsStore {
    /// A store that keeps settings in memory only.
    pub fn new(initial: Settings) -> Self {
        Self {
            current: Arc::new(Mutex::new(initial)),
            persist_tx: None,
        }
    }

    /// A store that forwards every change to `persist_tx`.
    pub fn with_persistence(initial: Settings, persist_tx: mpsc::UnboundedSender<Settings>) -> Self {
        Self {
            current: Arc::new(Mutex::new(initial)),
            persist_tx: Some(persist_tx),
        }
    }

    pub fn get(&self) -> Settings {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `patch` and return the new value.
    ///
    /// The in-memory value changes before this returns; the disk write
    /// happens later on the persistence task.
    pub fn set(&self, patch: SettingsPatch) -> Settings {
        let updated = {
            let mut guard = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            *guard = guard.apply(patch);
            *guard
        };
        debug!(
            lower = updated.lower_delay_bound,
            upper = updated.upper_delay_bound,
            delete_after = updated.delete_text_after_completion,
            "Settings updated"
        );

        if let Some(tx) = &self.persist_tx {
            if tx.send(updated).is_err() {
                warn!("Settings persistence task is gone; change kept in memory only");
            }
        }
        updated
    }
}

/// Write every settings value received on `rx` to `path`.
///
/// Bursts are coalesced: only the newest queued value is written. Returns when
/// all senders are dropped.
pub async fn run_persistence(mut rx: mpsc::UnboundedReceiver<Settings>, path: PathBuf) {
    while let Some(mut latest) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            latest = newer;
        }

        if let Err(e) = write_settings(&latest, &path).await {
            warn!(path = %path.display(), error = %e, "Failed to persist settings");
        }
    }
    debug!("Settings persistence task stopped");
}

async fn write_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, settings.to_toml()?).await?;
    debug!(path = %path.display(), "Settings persisted");
    Ok(())
}
