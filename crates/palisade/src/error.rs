//! Error types for the Palisade SDK.

use palisade_catalog::StoreError;
use palisade_config::ConfigError;
use palisade_guest::GuestTokenError;
use palisade_rbac::{ErrorObject, SecurityError};
use thiserror::Error;

/// Result type for Palisade operations.
pub type Result<T> = std::result::Result<T, PalisadeError>;

/// Top-level error type for the Palisade SDK.
#[derive(Debug, Error)]
pub enum PalisadeError {
    /// Access denied or synchronization failed.
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// Guest token issuance failed.
    #[error(transparent)]
    GuestToken(#[from] GuestTokenError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PalisadeError {
    /// The user-facing error object, for denials and guest token failures.
    pub fn error_object(&self) -> Option<ErrorObject> {
        match self {
            PalisadeError::Security(e) => e.error_object().cloned(),
            PalisadeError::GuestToken(e) => e.error_object(),
            PalisadeError::Store(_) | PalisadeError::Config(_) => None,
        }
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, PalisadeError::Security(e) if e.is_access_denied())
    }
}
