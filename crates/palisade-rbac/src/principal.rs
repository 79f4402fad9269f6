//! The identity an access check is evaluated for.

use std::fmt;

use palisade_catalog::{Dashboard, EmbeddedDashboard};
use palisade_types::{RoleId, UserId};
use serde::{Deserialize, Serialize};

/// Who is asking.
///
/// Guests are never persisted: they are rebuilt from a validated guest token
/// on every request and carry their grants inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User(UserPrincipal),
    Guest(GuestUser),
}

impl Principal {
    pub fn user(id: UserId, role_ids: impl IntoIterator<Item = RoleId>) -> Self {
        Principal::User(UserPrincipal {
            id,
            role_ids: role_ids.into_iter().collect(),
        })
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Principal::User(user) => Some(user.id),
            _ => None,
        }
    }

    pub fn as_guest(&self) -> Option<&GuestUser> {
        match self {
            Principal::Guest(guest) => Some(guest),
            _ => None,
        }
    }
}

/// A persisted, authenticated user and its assigned roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPrincipal {
    pub id: UserId,
    pub role_ids: Vec<RoleId>,
}

/// Identity claim of a guest token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestTokenUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Kind of object a guest grant names.
///
/// Unrecognized kinds decode as [`Unknown`](Self::Unknown) and grant nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuestTokenResourceType {
    Dashboard,
    #[serde(other)]
    Unknown,
}

/// A resource or dataset id as written in a token: a number or a string.
///
/// Ids compare by their string form, so `7` and `"7"` are the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GuestResourceId {
    Number(u64),
    Text(String),
}

impl GuestResourceId {
    pub fn matches(&self, other: &impl fmt::Display) -> bool {
        self.to_string() == other.to_string()
    }
}

impl fmt::Display for GuestResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestResourceId::Number(n) => write!(f, "{n}"),
            GuestResourceId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for GuestResourceId {
    fn from(value: u64) -> Self {
        GuestResourceId::Number(value)
    }
}

impl From<&str> for GuestResourceId {
    fn from(value: &str) -> Self {
        GuestResourceId::Text(value.to_string())
    }
}

/// A resource grant: the bearer may view this object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestTokenResource {
    #[serde(rename = "type")]
    pub resource_type: GuestTokenResourceType,
    pub id: GuestResourceId,
}

impl GuestTokenResource {
    pub fn dashboard(id: impl Into<GuestResourceId>) -> Self {
        Self {
            resource_type: GuestTokenResourceType::Dashboard,
            id: id.into(),
        }
    }
}

/// A row-level security clause embedded in a guest token.
///
/// Without a dataset scope the rule applies to every dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestTokenRlsRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<GuestResourceId>,
    pub clause: String,
}

impl GuestTokenRlsRule {
    pub fn new(clause: impl Into<String>) -> Self {
        Self {
            dataset: None,
            clause: clause.into(),
        }
    }

    #[must_use]
    pub fn for_dataset(mut self, dataset: impl Into<GuestResourceId>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    /// Whether the rule applies to the dataset with the given id.
    ///
    /// An empty-string scope counts as absent.
    pub fn applies_to(&self, dataset_id: &impl fmt::Display) -> bool {
        match &self.dataset {
            None => true,
            Some(GuestResourceId::Text(s)) if s.is_empty() => true,
            Some(scope) => scope.matches(dataset_id),
        }
    }
}

/// An ephemeral principal materialized from a guest token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestUser {
    pub user: GuestTokenUser,
    pub resources: Vec<GuestTokenResource>,
    pub rls: Vec<GuestTokenRlsRule>,
    /// The configured guest role, if it exists.
    pub role_id: Option<RoleId>,
}

impl GuestUser {
    pub fn username(&self) -> &str {
        self.user.username.as_deref().unwrap_or("guest_user")
    }

    fn dashboard_grants(&self) -> impl Iterator<Item = &GuestResourceId> {
        self.resources
            .iter()
            .filter(|r| r.resource_type == GuestTokenResourceType::Dashboard)
            .map(|r| &r.id)
    }

    /// Whether the token grants this dashboard, by id or by its embedding uuid.
    pub fn has_access(&self, dashboard: &Dashboard, embedded: Option<&EmbeddedDashboard>) -> bool {
        if self.dashboard_grants().any(|id| id.matches(&dashboard.id)) {
            return true;
        }
        let Some(embedded) = embedded else {
            return false;
        };
        self.dashboard_grants().any(|id| id.matches(&embedded.uuid))
    }
}
