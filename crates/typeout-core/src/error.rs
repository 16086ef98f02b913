use thiserror::Error;

/// Top-level error type for Typeout.
///
/// Subsystem crates return this type directly so that `?` works across crate
/// boundaries without per-crate conversions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TypeoutError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Typing engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for TypeoutError {
    fn from(err: toml::de::Error) -> Self {
        TypeoutError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for TypeoutError {
    fn from(err: toml::ser::Error) -> Self {
        TypeoutError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for TypeoutError {
    fn from(err: serde_json::Error) -> Self {
        TypeoutError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Typeout operations.
pub type Result<T> = std::result::Result<T, TypeoutError>;
