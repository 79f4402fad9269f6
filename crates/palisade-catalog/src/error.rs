//! Catalog error types.

use thiserror::Error;

/// Error type for catalog reads and writes.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced entity does not exist.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// A uniqueness constraint would be violated.
    #[error("duplicate {kind}: {key}")]
    Duplicate { kind: &'static str, key: String },

    /// The in-process store lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// The backing store failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, StoreError>;
