//! Error types for Replay.
//!
//! Every failure in the caching layer is fatal to the in-flight operation
//! and carries its original cause; nothing here retries.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Replay library.
#[derive(Debug, Error)]
pub enum ReplayError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // External tool errors
    #[error("External tool exited with code {code}: {command}: {stderr}")]
    ToolFailed {
        /// Full rendered command line that was attempted.
        command: String,
        /// Exit code, or -1 when the tool was terminated by a signal.
        code: i32,
        /// Captured stderr of the failed run.
        stderr: String,
    },

    // Collaborator errors
    #[error("Empty response from {context}")]
    EmptyResponse { context: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Replay operations.
pub type Result<T> = std::result::Result<T, ReplayError>;

// Conversion implementations for common error types

impl From<std::io::Error> for ReplayError {
    fn from(err: std::io::Error) -> Self {
        ReplayError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ReplayError {
    fn from(err: serde_json::Error) -> Self {
        ReplayError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for ReplayError {
    fn from(err: rusqlite::Error) -> Self {
        ReplayError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for ReplayError {
    fn from(err: reqwest::Error) -> Self {
        ReplayError::Network {
            message: err.to_string(),
            cause: Some(err.to_string()),
        }
    }
}

impl ReplayError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ReplayError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether the error came from a unique-constraint violation.
    ///
    /// Two callers racing on the same not-yet-stored hash surface here;
    /// the store does not resolve the race internally.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            ReplayError::Database {
                source: Some(rusqlite::Error::SqliteFailure(e, _)),
                ..
            } => e.code == rusqlite::ErrorCode::ConstraintViolation,
            _ => false,
        }
    }
}
