//! Persisted entities of the permission model.
//!
//! Permissions, resources and their pairs are the grant vocabulary; roles and
//! users hold grants; databases, datasources, charts and dashboards are the
//! protected objects whose identity strings become resource names.

use std::collections::BTreeSet;

use palisade_types::{
    ChartId, DashboardId, DatabaseId, DatasourceId, PermissionId, PvmId, ResourceId,
    RlsFilterId, RlsFilterType, RoleId, UserId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::perms;

/// An action class, e.g. `datasource_access` or `can_read`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
}

/// A protected object or UI surface, e.g. `[examples].(id:1)` or `Dashboard`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
}

/// A (permission, resource) pair.
///
/// The references are plain ids: an out-of-band delete of either side leaves
/// the pair dangling until the faulty-pair cleanup removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionResource {
    pub id: PvmId,
    pub permission_id: PermissionId,
    pub resource_id: ResourceId,
}

/// A pair with both sides resolved to their names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolvedPvm {
    pub id: PvmId,
    pub permission: String,
    pub resource: String,
}

/// A named set of permission-resource pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub pvm_ids: BTreeSet<PvmId>,
}

/// A persisted, authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub role_ids: Vec<RoleId>,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            role_ids: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role_id: RoleId) -> Self {
        self.role_ids.push(role_id);
        self
    }
}

/// A registered database connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub id: DatabaseId,
    pub name: String,
    /// Stored permission string; repaired on every persist.
    pub perm: Option<String>,
}

impl Database {
    pub fn new(id: DatabaseId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            perm: None,
        }
    }

    /// The permission string freshly derived from the current identity.
    pub fn derive_perm(&self) -> String {
        perms::database_perm(&self.name, self.id)
    }
}

/// A dataset backed by a table in a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datasource {
    pub id: DatasourceId,
    pub database_id: Option<DatabaseId>,
    pub schema: Option<String>,
    pub table_name: String,
    /// Stored `datasource_access` resource name; repaired on every persist.
    pub perm: Option<String>,
    /// Stored `schema_access` resource name; repaired on every persist.
    pub schema_perm: Option<String>,
    pub is_rls_supported: bool,
}

impl Datasource {
    pub fn new(id: DatasourceId, database_id: DatabaseId, table_name: impl Into<String>) -> Self {
        Self {
            id,
            database_id: Some(database_id),
            schema: None,
            table_name: table_name.into(),
            perm: None,
            schema_perm: None,
            is_rls_supported: true,
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Schema name, treating an empty string as absent.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref().filter(|s| !s.is_empty())
    }

    /// `[database].[table](id:<id>)`
    pub fn derive_perm(&self, database: &Database) -> String {
        perms::datasource_perm(&database.name, &self.table_name, self.id)
    }

    /// `[database].[schema]`, or `None` without a schema.
    pub fn derive_schema_perm(&self, database: &Database) -> Option<String> {
        perms::schema_perm(&database.name, self.schema())
    }

    /// Display name used in access-denied messages.
    pub fn name(&self) -> String {
        match self.schema() {
            Some(schema) => format!("{schema}.{}", self.table_name),
            None => self.table_name.clone(),
        }
    }
}

/// A visualization over a single datasource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chart {
    pub id: ChartId,
    pub datasource_id: DatasourceId,
}

/// A dashboard groups charts and carries its own access relationships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Dashboard {
    pub id: DashboardId,
    pub published: bool,
    pub owner_ids: Vec<UserId>,
    pub role_ids: Vec<RoleId>,
    pub chart_ids: Vec<ChartId>,
}

impl Dashboard {
    pub fn new(id: DashboardId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }

    #[must_use]
    pub fn with_owner(mut self, owner: UserId) -> Self {
        self.owner_ids.push(owner);
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: RoleId) -> Self {
        self.role_ids.push(role);
        self
    }

    #[must_use]
    pub fn with_chart(mut self, chart: ChartId) -> Self {
        self.chart_ids.push(chart);
        self
    }
}

/// The embedding wrapper that marks a dashboard as embeddable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedDashboard {
    pub uuid: Uuid,
    pub dashboard_id: DashboardId,
}

/// A row-level security rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowLevelSecurityFilter {
    pub id: RlsFilterId,
    pub filter_type: RlsFilterType,
    /// Filters sharing a group key are OR-ed together downstream.
    pub group_key: Option<String>,
    pub clause: String,
    pub role_ids: BTreeSet<RoleId>,
    pub table_ids: BTreeSet<DatasourceId>,
}

impl RowLevelSecurityFilter {
    pub fn new(id: RlsFilterId, filter_type: RlsFilterType, clause: impl Into<String>) -> Self {
        Self {
            id,
            filter_type,
            group_key: None,
            clause: clause.into(),
            role_ids: BTreeSet::new(),
            table_ids: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_group_key(mut self, group_key: impl Into<String>) -> Self {
        self.group_key = Some(group_key.into());
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: RoleId) -> Self {
        self.role_ids.insert(role);
        self
    }

    #[must_use]
    pub fn with_table(mut self, table: DatasourceId) -> Self {
        self.table_ids.insert(table);
        self
    }
}
