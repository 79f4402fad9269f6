//! Guest token issuance and validation.
//!
//! Tokens are HMAC-signed JWTs. Expiry is checked against an injected
//! [`Clock`] rather than by the JWT library so tests can move time.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use palisade_catalog::Catalog;
use palisade_rbac::{
    GuestResourceId, GuestTokenResource, GuestTokenResourceType, GuestTokenRlsRule,
    GuestTokenUser, GuestUser,
};
use palisade_types::{DashboardId, RoleId};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::claims::{GUEST_TOKEN_TYPE, GuestTokenClaims, VerifiedGuestToken};
use crate::clock::{Clock, SystemClock};
use crate::error::{GuestTokenError, Result};
use crate::request::{GUEST_TOKEN_FORM_FIELD, GuestRequest};

/// Default transport header.
pub const DEFAULT_HEADER_NAME: &str = "X-GuestToken";

/// Where the `aud` claim comes from.
#[derive(Clone)]
pub enum Audience {
    Fixed(String),
    /// Evaluated on every issue and validation.
    Dynamic(Arc<dyn Fn() -> String + Send + Sync>),
}

impl Audience {
    pub fn dynamic(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Audience::Dynamic(Arc::new(f))
    }

    fn resolve(&self) -> String {
        match self {
            Audience::Fixed(aud) => aud.clone(),
            Audience::Dynamic(f) => f(),
        }
    }
}

impl fmt::Debug for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::Fixed(aud) => f.debug_tuple("Fixed").field(aud).finish(),
            Audience::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Guest token settings.
#[derive(Clone)]
pub struct GuestTokenConfig {
    /// Secret key for signing/verifying tokens.
    secret: String,
    pub algorithm: Algorithm,
    /// Token lifetime in seconds.
    pub exp_seconds: u64,
    /// Falls back to the request host when unset.
    pub audience: Option<Audience>,
    pub header_name: String,
    /// Role guests are bound to.
    pub role_name: Option<String>,
}

impl GuestTokenConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            algorithm: Algorithm::HS256,
            exp_seconds: 300,
            audience: None,
            header_name: DEFAULT_HEADER_NAME.to_string(),
            role_name: None,
        }
    }

    /// Sets the signing algorithm. Only the HMAC family is accepted.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Result<Self> {
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(GuestTokenError::UnsupportedAlgorithm(format!("{algorithm:?}")));
        }
        self.algorithm = algorithm;
        Ok(self)
    }

    /// Sets the signing algorithm by its JWT name, e.g. `"HS512"`.
    pub fn with_algorithm_name(self, name: &str) -> Result<Self> {
        let algorithm = Algorithm::from_str(name)
            .map_err(|_| GuestTokenError::UnsupportedAlgorithm(name.to_string()))?;
        self.with_algorithm(algorithm)
    }

    #[must_use]
    pub fn with_exp_seconds(mut self, exp_seconds: u64) -> Self {
        self.exp_seconds = exp_seconds;
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: Audience) -> Self {
        self.audience = Some(audience);
        self
    }

    #[must_use]
    pub fn with_header_name(mut self, header_name: impl Into<String>) -> Self {
        self.header_name = header_name.into();
        self
    }

    #[must_use]
    pub fn with_role_name(mut self, role_name: impl Into<String>) -> Self {
        self.role_name = Some(role_name.into());
        self
    }
}

impl fmt::Debug for GuestTokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestTokenConfig")
            .field("secret", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("exp_seconds", &self.exp_seconds)
            .field("audience", &self.audience)
            .field("header_name", &self.header_name)
            .field("role_name", &self.role_name)
            .finish()
    }
}

/// Issues and validates guest tokens.
#[derive(Clone)]
pub struct GuestTokenService {
    config: GuestTokenConfig,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for GuestTokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestTokenService")
            .field("algorithm", &self.config.algorithm)
            .field("exp_seconds", &self.config.exp_seconds)
            .field("audience", &self.config.audience)
            .field("header_name", &self.config.header_name)
            .finish_non_exhaustive()
    }
}

impl GuestTokenService {
    pub fn new(config: GuestTokenConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: Audience) -> Self {
        self.config.audience = Some(audience);
        self
    }

    /// Swaps in new settings, keeping the clock. An audience already set is
    /// kept when `config` has none.
    #[must_use]
    pub fn with_config(mut self, mut config: GuestTokenConfig) -> Self {
        if config.audience.is_none() {
            config.audience = self.config.audience.take();
        }
        self.config = config;
        self
    }

    pub fn config(&self) -> &GuestTokenConfig {
        &self.config
    }

    fn audience(&self, host: Option<&str>) -> Result<String> {
        match (&self.config.audience, host) {
            (Some(audience), _) => Ok(audience.resolve()),
            (None, Some(host)) => Ok(host.to_string()),
            (None, None) => Err(GuestTokenError::MissingAudience),
        }
    }

    /// Signs a token granting `resources` to `user` under `rls_rules`.
    ///
    /// `host` is the externally observed request host, used as the audience
    /// when none is configured.
    pub fn issue(
        &self,
        user: GuestTokenUser,
        resources: Vec<GuestTokenResource>,
        rls_rules: Vec<GuestTokenRlsRule>,
        host: Option<&str>,
    ) -> Result<String> {
        let issued_at = self.clock.now();
        let expires_at = issued_at.saturating_add_secs(self.config.exp_seconds);
        let claims = GuestTokenClaims {
            user: Some(user),
            resources: Some(resources),
            rls_rules: Some(rls_rules),
            iat: issued_at.as_secs(),
            exp: expires_at.as_secs(),
            aud: self.audience(host)?,
            token_type: Some(GUEST_TOKEN_TYPE.to_string()),
        };

        let token = encode(
            &Header::new(self.config.algorithm),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
        .map_err(GuestTokenError::Encoding)?;

        debug!(aud = %claims.aud, exp = claims.exp, "Issued guest token");
        Ok(token)
    }

    /// Verifies signature, algorithm, audience and expiry, returning the raw claims.
    pub fn parse_guest_token(&self, raw: &str, host: Option<&str>) -> Result<GuestTokenClaims> {
        let mut validation = Validation::new(self.config.algorithm);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "aud"]);
        validation.set_audience(&[self.audience(host)?]);

        let data = decode::<GuestTokenClaims>(
            raw,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &validation,
        )
        .map_err(GuestTokenError::Decode)?;

        let now = self.clock.now().as_secs();
        if data.claims.exp <= now {
            return Err(GuestTokenError::Expired {
                exp: data.claims.exp,
                now,
            });
        }
        Ok(data.claims)
    }

    /// Full validation: [`parse_guest_token`](Self::parse_guest_token) plus
    /// the mandatory claim and discriminator checks.
    pub fn validate_guest_token(
        &self,
        raw: &str,
        host: Option<&str>,
    ) -> Result<VerifiedGuestToken> {
        self.parse_guest_token(raw, host)?.into_verified()
    }

    /// The raw token from the configured header, else the `guest_token` form field.
    pub fn raw_token<'r>(&self, request: &'r dyn GuestRequest) -> Option<&'r str> {
        request
            .header(&self.config.header_name)
            .filter(|t| !t.is_empty())
            .or_else(|| request.form_field(GUEST_TOKEN_FORM_FIELD))
            .filter(|t| !t.is_empty())
    }

    /// Materializes a guest principal from the request, if it carries a valid token.
    ///
    /// Rejections are logged with their reason and yield `None`.
    pub fn resolve_from_request(
        &self,
        request: &dyn GuestRequest,
        role_id: Option<RoleId>,
    ) -> Option<GuestUser> {
        let raw = self.raw_token(request)?;
        match self.validate_guest_token(raw, request.host()) {
            Ok(token) => {
                debug!(aud = %token.aud, resources = token.resources.len(), "Accepted guest token");
                Some(token.into_guest_user(role_id))
            }
            Err(error) => {
                warn!(%error, "Invalid guest token");
                None
            }
        }
    }

    /// Id of the configured guest role, if configured and present.
    pub fn guest_role_id(&self, catalog: &dyn Catalog) -> Result<Option<RoleId>> {
        let Some(name) = &self.config.role_name else {
            return Ok(None);
        };
        Ok(catalog.find_role(name)?.map(|role| role.id))
    }
}

/// Checks every dashboard grant resolves to a dashboard id or an embedding uuid.
pub fn validate_resources(catalog: &dyn Catalog, resources: &[GuestTokenResource]) -> Result<()> {
    for resource in resources {
        match resource.resource_type {
            GuestTokenResourceType::Dashboard => {
                if !dashboard_exists(catalog, &resource.id)? {
                    return Err(GuestTokenError::EmbeddedResourceNotFound(
                        resource.id.to_string(),
                    ));
                }
            }
            GuestTokenResourceType::Unknown => {
                debug!(id = %resource.id, "Skipping guest grant of unknown type");
            }
        }
    }
    Ok(())
}

fn dashboard_exists(catalog: &dyn Catalog, id: &GuestResourceId) -> Result<bool> {
    let id = id.to_string();
    if let Ok(n) = id.parse::<u64>()
        && catalog.dashboard(DashboardId::new(n))?.is_some()
    {
        return Ok(true);
    }
    if let Ok(uuid) = Uuid::parse_str(&id)
        && catalog.embedded_dashboard(&uuid)?.is_some()
    {
        return Ok(true);
    }
    Ok(false)
}
