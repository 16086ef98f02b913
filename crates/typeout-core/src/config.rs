use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TypeoutError};

/// Top-level configuration for the `typeout` front end.
///
/// Loaded from `~/.typeout/config.toml` by default. User preferences that the
/// session edits at runtime live in the separate settings file, see
/// [`crate::settings`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is missing
    /// or unreadable. The returned [`ConfigSource`] says which happened so the
    /// caller can report it once logging is set up.
    pub fn resolve(path: &Path) -> (Self, ConfigSource) {
        match Self::load(path) {
            Ok(config) => (config, ConfigSource::File),
            Err(TypeoutError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                (Self::default(), ConfigSource::Missing)
            }
            Err(e) => (Self::default(), ConfigSource::Invalid(e)),
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// Where a resolved [`AppConfig`] came from.
#[derive(Debug)]
pub enum ConfigSource {
    /// Parsed from the config file.
    File,
    /// No config file; defaults in use.
    Missing,
    /// The file exists but could not be read or parsed; defaults in use.
    Invalid(TypeoutError),
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level used when `RUST_LOG` is unset: trace, debug, info, warn, error.
    pub log_level: String,
    /// Where the user settings record is persisted.
    pub settings_path: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            settings_path: "~/.typeout/settings.toml".to_string(),
        }
    }
}

impl GeneralConfig {
    /// `settings_path` with a leading `~` expanded to the home directory.
    pub fn resolved_settings_path(&self) -> PathBuf {
        expand_home(&self.settings_path)
    }
}

/// Which typing engine the front end talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// Built-in engine that reports progress without injecting keystrokes.
    #[default]
    DryRun,
    /// External engine process speaking JSON lines over stdin/stdout.
    Process,
}

/// Typing engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: EngineMode,
    /// Executable launched in `process` mode.
    pub command: String,
    /// Arguments passed to `command`.
    pub args: Vec<String>,
    /// Label of the engine's start hotkey, shown while watching.
    pub start_key_label: String,
    /// Label of the engine's cancel hotkey.
    pub cancel_key_label: String,
    /// How long the dry-run engine pretends to wait for the start hotkey.
    pub dry_run_start_wait_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::DryRun,
            command: "typeout-engine".to_string(),
            args: vec![],
            start_key_label: "right control".to_string(),
            cancel_key_label: "escape".to_string(),
            dry_run_start_wait_ms: 1000,
        }
    }
}

/// Expand `~/` (or `~\`) to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") || path.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&path[2..])
    } else {
        PathBuf::from(path)
    }
}
