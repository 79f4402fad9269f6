//! Guest token claim set.

use palisade_rbac::{GuestTokenResource, GuestTokenRlsRule, GuestTokenUser, GuestUser};
use palisade_types::RoleId;
use serde::{Deserialize, Serialize};

/// Discriminator stored in the `type` claim of every guest token.
pub const GUEST_TOKEN_TYPE: &str = "guest";

/// Claims as they appear on the wire.
///
/// The payload claims are optional here so that a token missing one decodes
/// and is then rejected by [`GuestTokenClaims::into_verified`] with the
/// missing claim named in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestTokenClaims {
    #[serde(default)]
    pub user: Option<GuestTokenUser>,
    #[serde(default)]
    pub resources: Option<Vec<GuestTokenResource>>,
    #[serde(default)]
    pub rls_rules: Option<Vec<GuestTokenRlsRule>>,
    pub iat: u64,
    pub exp: u64,
    pub aud: String,
    #[serde(rename = "type", default)]
    pub token_type: Option<String>,
}

/// A guest token that passed signature, audience, expiry and claim checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedGuestToken {
    pub user: GuestTokenUser,
    pub resources: Vec<GuestTokenResource>,
    pub rls_rules: Vec<GuestTokenRlsRule>,
    pub iat: u64,
    pub exp: u64,
    pub aud: String,
}

impl GuestTokenClaims {
    /// Requires every mandatory payload claim and the guest discriminator.
    pub fn into_verified(self) -> crate::Result<VerifiedGuestToken> {
        let user = self.user.ok_or(crate::GuestTokenError::MissingClaim("user"))?;
        let resources = self
            .resources
            .ok_or(crate::GuestTokenError::MissingClaim("resources"))?;
        let rls_rules = self
            .rls_rules
            .ok_or(crate::GuestTokenError::MissingClaim("rls_rules"))?;
        if self.token_type.as_deref() != Some(GUEST_TOKEN_TYPE) {
            return Err(crate::GuestTokenError::NotGuestToken(self.token_type));
        }

        Ok(VerifiedGuestToken {
            user,
            resources,
            rls_rules,
            iat: self.iat,
            exp: self.exp,
            aud: self.aud,
        })
    }
}

impl VerifiedGuestToken {
    /// Materializes the ephemeral principal, bound to the guest role if one exists.
    pub fn into_guest_user(self, role_id: Option<RoleId>) -> GuestUser {
        GuestUser {
            user: self.user,
            resources: self.resources,
            rls: self.rls_rules,
            role_id,
        }
    }
}
