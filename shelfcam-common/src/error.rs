//! Common error types for shelfcam

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for shelfcam operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across shelfcam crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested store entry not found
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Move target is already occupied
    #[error("Already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Invalid input or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File or archive name does not follow the expected encoding
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn invalid_name(name: &str, reason: impl Into<String>) -> Self {
        Error::InvalidName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
