use thiserror::Error;

/// Top-level error type for the Nurture system.
///
/// Storage, auth, media and chat failures all funnel through this enum so
/// that the `?` operator works across crate boundaries. The API crate maps
/// each variant onto an HTTP status.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NurtureError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Media upload error: {0}")]
    Media(String),

    #[error("Chat error: {0}")]
    Chat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for NurtureError {
    fn from(err: toml::de::Error) -> Self {
        NurtureError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for NurtureError {
    fn from(err: toml::ser::Error) -> Self {
        NurtureError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for NurtureError {
    fn from(err: serde_json::Error) -> Self {
        NurtureError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Nurture operations.
pub type Result<T> = std::result::Result<T, NurtureError>;
