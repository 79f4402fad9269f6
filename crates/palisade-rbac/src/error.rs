//! Security errors and the structured error objects surfaced to callers.

use palisade_catalog::{Datasource, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::tables::Table;

/// Discriminator carried by every [`ErrorObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    TableSecurityAccessError,
    DatasourceSecurityAccessError,
    DashboardAccessDenied,
    UserActivitySecurityAccessError,
    InvalidGuestToken,
    EmbeddedResourceNotFound,
}

/// Severity of an [`ErrorObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLevel {
    Info,
    Warning,
    Error,
}

/// A denial rendered for a UI: type, message, severity and extra context.
///
/// `extra` may hold a `link` to permission instructions and the offending
/// `tables` or `datasource`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub error_type: ErrorType,
    pub message: String,
    pub level: ErrorLevel,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl ErrorObject {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            level: ErrorLevel::Error,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    fn with_link(self, link: Option<&str>) -> Self {
        match link {
            Some(link) => self.with_extra("link", link),
            None => self,
        }
    }

    /// Denial naming every table the principal could not reach.
    pub fn table_access(tables: &[Table], link: Option<&str>) -> Self {
        let quoted: Vec<String> = tables.iter().map(|t| format!("`{t}`")).collect();
        let message = format!(
            "You need access to the following tables: {}, \
             `all_database_access` or `all_datasource_access` permission",
            quoted.join(", ")
        );
        let names: Vec<Value> = tables
            .iter()
            .map(|t| Value::String(t.to_string()))
            .collect();
        Self::new(ErrorType::TableSecurityAccessError, message)
            .with_link(link)
            .with_extra("tables", names)
    }

    /// Denial for a single datasource.
    pub fn datasource_access(datasource: &Datasource, link: Option<&str>) -> Self {
        let name = datasource.name();
        let message = format!(
            "This endpoint requires the datasource {name}, \
             database or `all_datasource_access` permission"
        );
        Self::new(ErrorType::DatasourceSecurityAccessError, message)
            .with_link(link)
            .with_extra("datasource", name)
    }

    pub fn dashboard_access() -> Self {
        Self::new(
            ErrorType::DashboardAccessDenied,
            "You don't have access to this dashboard.",
        )
    }

    pub fn user_activity_access() -> Self {
        Self::new(
            ErrorType::UserActivitySecurityAccessError,
            "Access to user's activity data is restricted",
        )
    }

    pub fn invalid_guest_token() -> Self {
        Self::new(ErrorType::InvalidGuestToken, "Invalid guest token")
    }

    pub fn embedded_resource_not_found() -> Self {
        Self::new(
            ErrorType::EmbeddedResourceNotFound,
            "Embedded dashboard not found.",
        )
    }
}

/// Error type for access evaluation and role synchronization.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// One or more tables referenced by a table or query target are unreachable.
    #[error("{}", .0.message)]
    TableAccessDenied(ErrorObject),

    #[error("{}", .0.message)]
    DatasourceAccessDenied(ErrorObject),

    /// Relationship-only dashboard denial.
    #[error("{}", .0.message)]
    DashboardAccessDenied(ErrorObject),

    #[error("{}", .0.message)]
    UserActivityAccessDenied(ErrorObject),

    /// A regex role rule failed to compile; synchronization was aborted.
    #[error("invalid role pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("role not found: {0}")]
    RoleNotFound(String),

    /// The raw query could not be parsed for table references.
    #[error("failed to parse SQL: {0}")]
    SqlParse(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SecurityError {
    /// The structured error for denial variants.
    pub fn error_object(&self) -> Option<&ErrorObject> {
        match self {
            SecurityError::TableAccessDenied(obj)
            | SecurityError::DatasourceAccessDenied(obj)
            | SecurityError::DashboardAccessDenied(obj)
            | SecurityError::UserActivityAccessDenied(obj) => Some(obj),
            _ => None,
        }
    }

    /// Whether this is an authorization denial rather than an operational failure.
    pub fn is_access_denied(&self) -> bool {
        self.error_object().is_some()
    }
}

/// Result type for security operations.
pub type Result<T> = std::result::Result<T, SecurityError>;

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_types::{DatabaseId, DatasourceId};

    #[test]
    fn table_error_lists_quoted_tables() {
        let tables = vec![Table::new("orders", Some("public")), Table::new("users", None)];
        let obj = ErrorObject::table_access(&tables, Some("https://docs/perms"));

        assert_eq!(obj.error_type, ErrorType::TableSecurityAccessError);
        assert!(obj.message.contains("`public.orders`, `users`"));
        assert_eq!(obj.extra["link"], "https://docs/perms");
        assert_eq!(obj.extra["tables"], serde_json::json!(["public.orders", "users"]));
    }

    #[test]
    fn datasource_error_names_datasource() {
        let ds = Datasource::new(DatasourceId::new(4), DatabaseId::new(1), "orders")
            .with_schema("sales");
        let obj = ErrorObject::datasource_access(&ds, None);

        assert!(obj.message.contains("datasource sales.orders"));
        assert_eq!(obj.extra["datasource"], "sales.orders");
        assert!(!obj.extra.contains_key("link"));
    }

    #[test]
    fn error_object_serializes_type_and_level() {
        let json = serde_json::to_value(ErrorObject::dashboard_access()).unwrap();
        assert_eq!(json["error_type"], "DASHBOARD_ACCESS_DENIED");
        assert_eq!(json["level"], "error");
        assert!(json.get("extra").is_none());
    }

    #[test]
    fn only_denials_carry_error_objects() {
        let denied = SecurityError::DashboardAccessDenied(ErrorObject::dashboard_access());
        assert!(denied.is_access_denied());
        assert_eq!(denied.to_string(), "You don't have access to this dashboard.");

        let other = SecurityError::RoleNotFound("Gamma".to_string());
        assert!(other.error_object().is_none());
    }
}
