//! Error types for the sync server.

use thiserror::Error;
use wool_core::error::WoolError;

/// Result type alias using [`ServerError`].
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors surfaced by the sync service and its collaborators.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The save store failed.
    #[error("Save store error: {0}")]
    Store(String),

    /// Configuration file could not be read or parsed.
    #[error("Failed to load config '{path}': {message}")]
    Config {
        /// Path of the config file.
        path: String,
        /// Error message.
        message: String,
    },

    /// The request is not acceptable.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No save exists for the player.
    #[error("No save stored for player '{0}'")]
    UnknownPlayer(String),

    /// Error from the save core.
    #[error(transparent)]
    Core(#[from] WoolError),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
