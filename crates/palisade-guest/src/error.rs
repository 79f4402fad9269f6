//! Error types for the guest credential subsystem.

use palisade_catalog::StoreError;
use palisade_rbac::ErrorObject;
use thiserror::Error;

/// Failures while issuing or validating guest tokens.
///
/// Every variant except [`GuestTokenError::EmbeddedResourceNotFound`],
/// [`GuestTokenError::Encoding`] and [`GuestTokenError::Store`] is a reason a
/// presented token was rejected. Those reasons are logged but callers only
/// ever see [`ErrorType::InvalidGuestToken`](palisade_rbac::ErrorType).
#[derive(Debug, Error)]
pub enum GuestTokenError {
    #[error("failed to decode guest token: {0}")]
    Decode(#[source] jsonwebtoken::errors::Error),

    #[error("guest token expired at {exp} (now {now})")]
    Expired { exp: u64, now: u64 },

    #[error("guest token is missing the `{0}` claim")]
    MissingClaim(&'static str),

    #[error("token type {0:?} is not a guest token")]
    NotGuestToken(Option<String>),

    #[error("no guest token audience configured and the request host is unknown")]
    MissingAudience,

    #[error("unsupported guest token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("embedded resource not found: {0}")]
    EmbeddedResourceNotFound(String),

    #[error("failed to encode guest token: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GuestTokenError {
    /// Whether this error rejects a presented token.
    pub fn is_invalid_token(&self) -> bool {
        matches!(
            self,
            GuestTokenError::Decode(_)
                | GuestTokenError::Expired { .. }
                | GuestTokenError::MissingClaim(_)
                | GuestTokenError::NotGuestToken(_)
                | GuestTokenError::MissingAudience
        )
    }

    /// The user-facing error object, if this error has one.
    pub fn error_object(&self) -> Option<ErrorObject> {
        match self {
            GuestTokenError::EmbeddedResourceNotFound(_) => {
                Some(ErrorObject::embedded_resource_not_found())
            }
            e if e.is_invalid_token() => Some(ErrorObject::invalid_guest_token()),
            _ => None,
        }
    }
}

/// Result type for guest token operations.
pub type Result<T> = std::result::Result<T, GuestTokenError>;
