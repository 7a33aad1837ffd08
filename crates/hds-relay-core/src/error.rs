//! Error types for the HDS relay
//!
//! Ingestion-boundary errors (bad payloads, unknown keys) are separated from
//! exporter delivery failures so that callers can decide which ones are fatal.

use thiserror::Error;

/// Main error type for relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// File access or socket I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload or configuration parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// A metric key that the health record does not track
    #[error("Unknown metric key: {0}")]
    UnknownKey(String),

    /// Exporter delivery failure
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl RelayError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        RelayError::Config(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        RelayError::Parse(msg.into())
    }

    /// Check if this error was caused by user input (vs. the environment)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            RelayError::Config(_) | RelayError::Parse(_) | RelayError::UnknownKey(_)
        )
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Parse(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for RelayError {
    fn from(err: serde_yaml::Error) -> Self {
        RelayError::Parse(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for RelayError {
    fn from(err: toml::de::Error) -> Self {
        RelayError::Parse(format!("TOML error: {}", err))
    }
}

/// Failure to forward an update to an external system
#[derive(Error, Debug)]
pub enum ExportError {
    /// Network send failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Message could not be encoded for the target protocol
    #[error("Encode error: {0}")]
    Encode(String),

    /// The exporter has shut down and no longer accepts updates
    #[error("Exporter closed: {0}")]
    Closed(String),
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Transport(err.to_string())
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
