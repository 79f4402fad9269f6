//! # palisade-guest: Guest credentials for embedded resources
//!
//! Issues and validates signed, time-bounded, audience-scoped tokens that let
//! an unauthenticated viewer reach specific embedded dashboards under
//! token-supplied row-level security rules.
//!
//! A token moves through three states:
//!
//! ```text
//! issued ──► valid ──► expired
//!              │
//!              └─────► rejected (signature, audience or claim check failed)
//! ```
//!
//! There is no renewal; a new token must be issued.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use palisade_guest::{FixedClock, GuestTokenConfig, GuestTokenService, RequestParts};
//! use palisade_rbac::{GuestTokenResource, GuestTokenUser};
//! use palisade_types::Timestamp;
//!
//! let clock = Arc::new(FixedClock::new(Timestamp::from_secs(1_700_000_000)));
//! let service = GuestTokenService::new(GuestTokenConfig::new("secret")).with_clock(clock);
//!
//! let token = service.issue(
//!     GuestTokenUser::default(),
//!     vec![GuestTokenResource::dashboard(7)],
//!     Vec::new(),
//!     Some("bi.example.com"),
//! )?;
//!
//! let request = RequestParts::new()
//!     .with_header("X-GuestToken", token)
//!     .with_host("bi.example.com");
//! let guest = service.resolve_from_request(&request, None).expect("valid token");
//! assert_eq!(guest.resources, vec![GuestTokenResource::dashboard(7)]);
//! # Ok::<(), palisade_guest::GuestTokenError>(())
//! ```

pub mod claims;
pub mod clock;
pub mod error;
pub mod request;
pub mod service;

pub use claims::{GUEST_TOKEN_TYPE, GuestTokenClaims, VerifiedGuestToken};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{GuestTokenError, Result};
pub use request::{GUEST_TOKEN_FORM_FIELD, GuestRequest, RequestParts};
pub use service::{
    Audience, DEFAULT_HEADER_NAME, GuestTokenConfig, GuestTokenService, validate_resources,
};
