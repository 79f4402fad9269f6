//! Translation from file/env configuration into component settings.

use palisade_config::PalisadeConfig;
use palisade_guest::{Audience, GuestTokenConfig};
use palisade_rbac::{AccessSettings, RoleSynchronizer};

use crate::error::Result;

pub fn access_settings(config: &PalisadeConfig) -> AccessSettings {
    AccessSettings {
        public_role: config.auth.role_public.clone(),
        admin_role: config.auth.admin_role.clone(),
        embedded: config.features.embedded,
        dashboard_rbac: config.features.dashboard_rbac,
        broad_activity_access: config.activity.broad_access,
        permission_instructions_link: config.permission_instructions_link.clone(),
    }
}

pub fn guest_token_config(config: &PalisadeConfig) -> Result<GuestTokenConfig> {
    let section = &config.guest_token;
    let mut guest = GuestTokenConfig::new(section.secret.clone())
        .with_algorithm_name(&section.algorithm)?
        .with_exp_seconds(section.exp_seconds)
        .with_header_name(section.header_name.clone());
    if let Some(audience) = &section.audience {
        guest = guest.with_audience(Audience::Fixed(audience.clone()));
    }
    if let Some(role_name) = &section.role_name {
        guest = guest.with_role_name(role_name.clone());
    }
    Ok(guest)
}

pub fn role_synchronizer(config: &PalisadeConfig) -> RoleSynchronizer {
    RoleSynchronizer::new().with_public_role_like(
        config.auth.role_public.clone(),
        config.auth.public_role_like.clone(),
    )
}
