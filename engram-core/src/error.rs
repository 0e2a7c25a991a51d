//! Error types for the engram core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering storage, text generation, event publishing, and configuration.

use std::path::PathBuf;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, EngramError>;

/// Top-level error type for the engram core library.
#[derive(Debug, thiserror::Error)]
pub enum EngramError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Generation error: {0}")]
    Generate(#[from] GenerateError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the per-agent memory store.
///
/// Absence of a record is never an error: operations that reference an id
/// that may not exist (`record_outcome`, `deactivate_pattern`) report it
/// through their `bool` return value instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database could not be opened or created. Fatal to the operation.
    #[error("Store unavailable at {path}: {message}")]
    Unavailable { path: PathBuf, message: String },

    /// A write could not acquire its lock within the busy timeout.
    /// The caller may retry.
    #[error("Store busy: {message}")]
    Busy { message: String },

    /// Any other SQLite failure.
    #[error("Query failed: {message}")]
    Query { message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StoreError::Busy {
                    message: err.to_string(),
                }
            }
            _ => StoreError::Query {
                message: err.to_string(),
            },
        }
    }
}

/// Errors from the external text-generation collaborator.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("Provider request failed: {message}")]
    Request { message: String },

    #[error("Provider returned an empty response")]
    Empty,

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Errors from the external event-notification collaborator.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Publish failed: {message}")]
    Publish { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}
