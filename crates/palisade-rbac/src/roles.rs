//! Built-in role definitions and the policy that classifies pairs into them.
//!
//! A built-in role is either a predicate over a (permission, resource) pair or
//! a list of regex pattern pairs. Both are data: adding a role means adding a
//! [`RoleDefinition`], not touching the synchronizer.
//!
//! Predicates build on each other:
//! - **Admin**: every pair that is not user-defined (object-scoped data access)
//! - **Alpha**: not user-defined and not admin-only, or accessible to all
//! - **Gamma**: as Alpha, additionally excluding alpha-only pairs
//! - **sql_lab**: a literal allow-list of pairs
//! - **granter**: the role-escalation permissions

use std::collections::BTreeSet;

use palisade_catalog::ResolvedPvm;
use palisade_catalog::perms::OBJECT_SPEC_PERMISSIONS;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SecurityError};

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

/// Fixed view and permission name sets the predicates consult.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationPolicy {
    /// Views only admins may do more than read.
    pub read_only_model_views: BTreeSet<String>,
    /// Views only admins and alphas may do more than read.
    pub gamma_read_only_model_views: BTreeSet<String>,
    pub admin_only_view_menus: BTreeSet<String>,
    pub alpha_only_view_menus: BTreeSet<String>,
    pub admin_only_permissions: BTreeSet<String>,
    pub alpha_only_permissions: BTreeSet<String>,
    pub read_only_permissions: BTreeSet<String>,
    /// Permissions every non-admin built-in role keeps.
    pub accessible_permissions: BTreeSet<String>,
    /// `(permission, resource)` pairs granted to `sql_lab`.
    pub sql_lab_pairs: BTreeSet<(String, String)>,
    pub granter_permissions: BTreeSet<String>,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        let read_only_model_views = set(&["Database", "DruidClusterModelView", "DynamicPlugin"]);
        let user_model_views = set(&[
            "UserDBModelView",
            "UserLDAPModelView",
            "UserOAuthModelView",
            "UserOIDModelView",
            "UserRemoteUserModelView",
        ]);

        let mut gamma_read_only_model_views = set(&["Dataset", "Datasource"]);
        gamma_read_only_model_views.extend(read_only_model_views.iter().cloned());

        let mut admin_only_view_menus = set(&[
            "AccessRequestsModelView",
            "SQL Lab",
            "Refresh Druid Metadata",
            "ResetPasswordView",
            "RoleModelView",
            "Log",
            "Security",
            "Row Level Security",
            "Row Level Security Filters",
            "RowLevelSecurityFiltersModelView",
        ]);
        admin_only_view_menus.extend(user_model_views);

        let sql_lab_pairs = [
            ("can_csv", "Palisade"),
            ("can_read", "SavedQuery"),
            ("can_read", "Database"),
            ("can_sql_json", "Palisade"),
            ("can_sqllab_viz", "Palisade"),
            ("can_sqllab_table_viz", "Palisade"),
            ("can_sqllab", "Palisade"),
            ("menu_access", "SQL Lab"),
            ("menu_access", "SQL Editor"),
            ("menu_access", "Saved Queries"),
            ("menu_access", "Query Search"),
        ]
        .iter()
        .map(|(p, r)| ((*p).to_string(), (*r).to_string()))
        .collect();

        Self {
            read_only_model_views,
            gamma_read_only_model_views,
            admin_only_view_menus,
            alpha_only_view_menus: set(&[
                "Manage",
                "CSS Templates",
                "Queries",
                "Import dashboards",
                "Upload a CSV",
            ]),
            admin_only_permissions: set(&[
                "can_sql_json",
                "can_override_role_permissions",
                "can_sync_druid_source",
                "can_approve",
                "can_update_role",
                "all_query_access",
                "can_grant_guest_token",
                "can_set_embedded",
            ]),
            alpha_only_permissions: set(&[
                "muldelete",
                "all_database_access",
                "all_datasource_access",
            ]),
            read_only_permissions: set(&[
                "can_show",
                "can_list",
                "can_get",
                "can_external_metadata",
                "can_external_metadata_by_name",
                "can_read",
            ]),
            accessible_permissions: set(&["can_userinfo", "resetmypassword"]),
            sql_lab_pairs,
            granter_permissions: set(&["can_override_role_permissions", "can_approve"]),
        }
    }
}

impl ClassificationPolicy {
    fn is_user_defined(pvm: &ResolvedPvm) -> bool {
        OBJECT_SPEC_PERMISSIONS.contains(&pvm.permission.as_str())
    }

    /// Read-only operations on read-only model views are still admin-only
    /// unless the permission itself is a read.
    fn is_admin_only(&self, pvm: &ResolvedPvm) -> bool {
        if self.read_only_model_views.contains(&pvm.resource)
            && !self.read_only_permissions.contains(&pvm.permission)
        {
            return true;
        }
        self.admin_only_view_menus.contains(&pvm.resource)
            || self.admin_only_permissions.contains(&pvm.permission)
    }

    fn is_alpha_only(&self, pvm: &ResolvedPvm) -> bool {
        if self.gamma_read_only_model_views.contains(&pvm.resource)
            && !self.read_only_permissions.contains(&pvm.permission)
        {
            return true;
        }
        self.alpha_only_view_menus.contains(&pvm.resource)
            || self.alpha_only_permissions.contains(&pvm.permission)
    }

    fn is_accessible_to_all(&self, pvm: &ResolvedPvm) -> bool {
        self.accessible_permissions.contains(&pvm.permission)
    }

    /// Evaluates a built-in predicate against one pair.
    pub fn classify(&self, classifier: Classifier, pvm: &ResolvedPvm) -> bool {
        match classifier {
            Classifier::Admin => !Self::is_user_defined(pvm),
            Classifier::Alpha => {
                !(Self::is_user_defined(pvm) || self.is_admin_only(pvm))
                    || self.is_accessible_to_all(pvm)
            }
            Classifier::Gamma => {
                !(Self::is_user_defined(pvm) || self.is_admin_only(pvm) || self.is_alpha_only(pvm))
                    || self.is_accessible_to_all(pvm)
            }
            Classifier::SqlLab => self
                .sql_lab_pairs
                .contains(&(pvm.permission.clone(), pvm.resource.clone())),
            Classifier::Granter => self.granter_permissions.contains(&pvm.permission),
        }
    }
}

/// Named predicates over a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classifier {
    Admin,
    Alpha,
    Gamma,
    SqlLab,
    Granter,
}

/// A `(resource, permission)` regex pair; both must match from the start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PvmPattern {
    pub resource: String,
    pub permission: String,
}

impl PvmPattern {
    pub fn new(resource: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            permission: permission.into(),
        }
    }
}

/// How a built-in role's membership is derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleRule {
    Predicate(Classifier),
    Patterns(Vec<PvmPattern>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    pub rule: RoleRule,
}

impl RoleDefinition {
    pub fn predicate(name: impl Into<String>, classifier: Classifier) -> Self {
        Self {
            name: name.into(),
            rule: RoleRule::Predicate(classifier),
        }
    }

    pub fn patterns(name: impl Into<String>, patterns: Vec<PvmPattern>) -> Self {
        Self {
            name: name.into(),
            rule: RoleRule::Patterns(patterns),
        }
    }

    /// The five predicate-defined roles, in synchronization order.
    pub fn builtins() -> Vec<RoleDefinition> {
        vec![
            Self::predicate("Admin", Classifier::Admin),
            Self::predicate("Alpha", Classifier::Alpha),
            Self::predicate("Gamma", Classifier::Gamma),
            Self::predicate("granter", Classifier::Granter),
            Self::predicate("sql_lab", Classifier::SqlLab),
        ]
    }

    pub(crate) fn compile(&self) -> Result<CompiledRule> {
        match &self.rule {
            RoleRule::Predicate(classifier) => Ok(CompiledRule::Predicate(*classifier)),
            RoleRule::Patterns(patterns) => patterns
                .iter()
                .map(|p| Ok((anchored(&p.resource)?, anchored(&p.permission)?)))
                .collect::<Result<Vec<_>>>()
                .map(CompiledRule::Patterns),
        }
    }
}

// Prefix match, like a regex `match` rather than a `search`.
fn anchored(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|source| SecurityError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// A role rule ready to evaluate.
#[derive(Debug, Clone)]
pub(crate) enum CompiledRule {
    Predicate(Classifier),
    Patterns(Vec<(Regex, Regex)>),
}

impl CompiledRule {
    pub(crate) fn matches(&self, policy: &ClassificationPolicy, pvm: &ResolvedPvm) -> bool {
        match self {
            CompiledRule::Predicate(classifier) => policy.classify(*classifier, pvm),
            CompiledRule::Patterns(patterns) => patterns
                .iter()
                .any(|(resource, permission)| {
                    resource.is_match(&pvm.resource) && permission.is_match(&pvm.permission)
                }),
        }
    }
}
