//! Error types for the store module.

use keyward_core::CoreError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No matching row. Routine; not a failure of the store.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// An active short code already exists for this target and usage.
    #[error("active short code already exists for usage {usage} and target")]
    AlreadyExists { usage: String },

    /// A persisted value could not be mapped back to the data model.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A backend lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// The caller went away before the operation committed. Nothing was
    /// written.
    #[error("operation cancelled before commit")]
    Cancelled,

    /// The blocking worker running the operation failed.
    #[error("blocking task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StoreError::Cancelled)
    }
}

impl From<CoreError> for StoreError {
    fn from(e: CoreError) -> Self {
        StoreError::InvalidData(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
