//! Configuration management for Palisade
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (PALISADE_* prefix, `__` between nested keys)
//! 2. palisade.local.toml (gitignored, local overrides)
//! 3. palisade.toml (git-tracked, project config)
//! 4. ~/.config/palisade/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main Palisade configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PalisadeConfig {
    pub auth: AuthConfig,
    pub features: FeatureFlags,
    pub activity: ActivityConfig,
    pub guest_token: GuestTokenSettings,
    /// Help link placed in denial error objects.
    pub permission_instructions_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Role bound to anonymous users.
    pub role_public: Option<String>,
    /// Built-in role whose grants are merged onto the public role on sync.
    pub public_role_like: Option<String>,
    pub admin_role: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            role_public: Some("Public".to_string()),
            public_role_like: None,
            admin_role: "Admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Enables guest principals.
    pub embedded: bool,
    /// Grants dashboard access through dashboard roles.
    pub dashboard_rbac: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Lets any logged-in user read other users' activity.
    pub broad_access: bool,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self { broad_access: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestTokenSettings {
    pub secret: String,
    pub algorithm: String,
    pub exp_seconds: u64,
    /// Falls back to the request host when unset.
    pub audience: Option<String>,
    pub header_name: String,
    pub role_name: Option<String>,
}

impl Default for GuestTokenSettings {
    fn default() -> Self {
        Self {
            secret: "test-guest-secret-change-me".to_string(),
            algorithm: "HS256".to_string(),
            exp_seconds: 300,
            audience: None,
            header_name: "X-GuestToken".to_string(),
            role_name: None,
        }
    }
}

const HMAC_ALGORITHMS: [&str; 3] = ["HS256", "HS384", "HS512"];

impl PalisadeConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Parse a single TOML file, without layering.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the type system cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let guest = &self.guest_token;
        if !HMAC_ALGORITHMS.contains(&guest.algorithm.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "guest_token.algorithm must be one of {HMAC_ALGORITHMS:?}, got {:?}",
                guest.algorithm
            )));
        }
        if guest.exp_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "guest_token.exp_seconds must be positive".to_string(),
            ));
        }
        if guest.header_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "guest_token.header_name must not be empty".to_string(),
            ));
        }
        if self.features.embedded && guest.secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "guest_token.secret is required when features.embedded is on".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = PalisadeConfig::default();
        assert_eq!(config.auth.role_public.as_deref(), Some("Public"));
        assert_eq!(config.auth.admin_role, "Admin");
        assert!(!config.features.embedded);
        assert!(config.activity.broad_access);
        assert_eq!(config.guest_token.exp_seconds, 300);
        assert_eq!(config.guest_token.header_name, "X-GuestToken");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_guest_settings() {
        let mut config = PalisadeConfig::default();
        config.guest_token.algorithm = "RS256".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = PalisadeConfig::default();
        config.guest_token.exp_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = PalisadeConfig::default();
        config.features.embedded = true;
        config.guest_token.secret = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("palisade.toml");
        std::fs::write(
            &path,
            r#"
[features]
embedded = true

[guest_token]
secret = "s3cret"
role_name = "Gamma"
"#,
        )
        .expect("Failed to write config");

        let config = PalisadeConfig::from_file(&path).expect("Failed to parse config");
        assert!(config.features.embedded);
        assert_eq!(config.guest_token.secret, "s3cret");
        assert_eq!(config.guest_token.role_name.as_deref(), Some("Gamma"));
        assert_eq!(config.guest_token.algorithm, "HS256");
    }

    #[test]
    fn test_from_file_errors() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let missing = temp_dir.path().join("absent.toml");
        assert!(matches!(
            PalisadeConfig::from_file(&missing),
            Err(ConfigError::ReadError { .. })
        ));

        let broken = temp_dir.path().join("broken.toml");
        std::fs::write(&broken, "[features\nembedded = ").expect("Failed to write config");
        assert!(matches!(
            PalisadeConfig::from_file(&broken),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
