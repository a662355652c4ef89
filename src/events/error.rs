//! Event store error types
//!
//! Defines all errors that can occur while validating, persisting or
//! fetching quiz events.

use thiserror::Error;

/// Errors that can occur in the event store layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed event rejected at ingestion (nothing was stored)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A backend could not be reached or answered with an error
    #[error("Backend '{backend}' unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// SQLite operation failed
    #[error("SQLite error: {0}")]
    Sqlite(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl StoreError {
    pub fn unavailable(backend: impl Into<String>, reason: impl ToString) -> Self {
        StoreError::BackendUnavailable {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Sqlite(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
