//! Hierarchical access evaluation for one principal.
//!
//! An [`AccessEvaluator`] is built per request. The principal's roles and
//! their resolved (permission, resource) pairs are loaded on first use and
//! cached for the evaluator's lifetime; every check after that is a pure
//! function of the catalog snapshot and the settings.

use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use palisade_catalog::perms::{
    self, ALL_DATABASE_ACCESS, ALL_DATASOURCE_ACCESS, ALL_QUERY_ACCESS, DATABASE_ACCESS,
    DATASOURCE_ACCESS, SCHEMA_ACCESS,
};
use palisade_catalog::{Catalog, Dashboard, Database, Datasource, Role};
use palisade_types::{RoleId, UserId};
use tracing::{debug, warn};

use crate::error::{ErrorObject, Result, SecurityError};
use crate::principal::{GuestUser, Principal};
use crate::tables::{SqlParserExtractor, Table, TableExtractor};

static DEFAULT_EXTRACTOR: SqlParserExtractor = SqlParserExtractor;

/// Deployment switches that change how checks resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSettings {
    /// Role bound to anonymous principals.
    pub public_role: Option<String>,
    /// Role identifying platform administrators.
    pub admin_role: String,
    /// Whether guest principals are recognized at all.
    pub embedded: bool,
    /// Role-based dashboard access.
    pub dashboard_rbac: bool,
    /// Lets any authenticated user read other users' activity.
    pub broad_activity_access: bool,
    /// Put into denial error objects as `extra.link`.
    pub permission_instructions_link: Option<String>,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            public_role: Some("Public".to_string()),
            admin_role: "Admin".to_string(),
            embedded: false,
            dashboard_rbac: false,
            broad_activity_access: true,
            permission_instructions_link: None,
        }
    }
}

/// What a [`AccessEvaluator::raise_for_access`] call protects.
///
/// Charts and query contexts resolve to their datasource before the check.
#[derive(Debug, Clone, Copy)]
pub enum AccessTarget<'t> {
    /// A single table in a database.
    Table {
        database: &'t Database,
        table: &'t Table,
    },
    /// Every table a raw query reads; unqualified tables use `schema`.
    Query {
        database: &'t Database,
        sql: &'t str,
        schema: Option<&'t str>,
    },
    Datasource(&'t Datasource),
}

/// Independent ways a datasource can be reached, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Probe {
    /// `all_datasource_access`.
    UniversalGrant,
    /// Full access to the owning database.
    DatabaseGrant,
    /// `schema_access` on the datasource's schema.
    SchemaGrant,
    /// `datasource_access` on the datasource itself.
    DirectGrant,
    /// Through a dashboard the principal may open that charts the datasource.
    /// Only consulted with role-based dashboard access or for guests.
    DashboardRelationship,
}

impl Probe {
    pub const ORDER: [Probe; 5] = [
        Probe::UniversalGrant,
        Probe::DatabaseGrant,
        Probe::SchemaGrant,
        Probe::DirectGrant,
        Probe::DashboardRelationship,
    ];
}

#[derive(Debug)]
pub(crate) struct Grants {
    pub(crate) roles: Vec<Role>,
    pairs: HashSet<(String, String)>,
}

impl Grants {
    fn load(
        catalog: &dyn Catalog,
        principal: &Principal,
        settings: &AccessSettings,
    ) -> Result<Self> {
        let role_ids: Vec<RoleId> = match principal {
            Principal::Anonymous => match &settings.public_role {
                Some(name) => catalog.find_role(name)?.map(|r| r.id).into_iter().collect(),
                None => Vec::new(),
            },
            Principal::User(user) => user.role_ids.clone(),
            Principal::Guest(guest) => guest.role_id.into_iter().collect(),
        };

        let mut roles = Vec::with_capacity(role_ids.len());
        let mut pairs = HashSet::new();
        for id in role_ids {
            let Some(role) = catalog.role(id)? else {
                continue;
            };
            for pvm_id in &role.pvm_ids {
                let Some(pvm) = catalog.pvm(*pvm_id)? else {
                    continue;
                };
                if let Some(resolved) = catalog.resolve_pvm(&pvm)? {
                    pairs.insert((resolved.permission, resolved.resource));
                }
            }
            roles.push(role);
        }
        Ok(Self { roles, pairs })
    }

    fn has(&self, permission: &str, resource: &str) -> bool {
        self.pairs
            .contains(&(permission.to_string(), resource.to_string()))
    }
}

fn allowed(result: Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_access_denied() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Evaluates access checks for a single principal.
pub struct AccessEvaluator<'a> {
    catalog: &'a dyn Catalog,
    principal: &'a Principal,
    settings: &'a AccessSettings,
    extractor: &'a dyn TableExtractor,
    grants: OnceCell<Grants>,
}

impl<'a> AccessEvaluator<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        principal: &'a Principal,
        settings: &'a AccessSettings,
    ) -> Self {
        Self {
            catalog,
            principal,
            settings,
            extractor: &DEFAULT_EXTRACTOR,
            grants: OnceCell::new(),
        }
    }

    /// Replaces the SQL table extractor used for query targets.
    pub fn with_extractor(mut self, extractor: &'a dyn TableExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn principal(&self) -> &Principal {
        self.principal
    }

    pub(crate) fn catalog(&self) -> &dyn Catalog {
        self.catalog
    }

    pub(crate) fn grants(&self) -> Result<&Grants> {
        if let Some(grants) = self.grants.get() {
            return Ok(grants);
        }
        let loaded = Grants::load(self.catalog, self.principal, self.settings)?;
        Ok(self.grants.get_or_init(|| loaded))
    }

    fn link(&self) -> Option<&str> {
        self.settings.permission_instructions_link.as_deref()
    }

    // ------------------------------------------------------------------------
    // Principal
    // ------------------------------------------------------------------------

    /// The guest behind this request, if guests are enabled.
    pub fn guest(&self) -> Option<&GuestUser> {
        if !self.settings.embedded {
            return None;
        }
        self.principal.as_guest()
    }

    pub fn is_guest(&self) -> bool {
        self.guest().is_some()
    }

    /// Roles the principal holds; anonymous principals hold the public role.
    pub fn user_roles(&self) -> Result<&[Role]> {
        Ok(&self.grants()?.roles)
    }

    pub fn is_admin(&self) -> Result<bool> {
        Ok(self
            .user_roles()?
            .iter()
            .any(|r| r.name == self.settings.admin_role))
    }

    // ------------------------------------------------------------------------
    // Grant checks
    // ------------------------------------------------------------------------

    /// Whether any held role carries the (permission, resource) pair.
    pub fn can_access(&self, permission: &str, resource: &str) -> Result<bool> {
        Ok(self.grants()?.has(permission, resource))
    }

    pub fn can_access_all_queries(&self) -> Result<bool> {
        self.can_access(ALL_QUERY_ACCESS, ALL_QUERY_ACCESS)
    }

    pub fn can_access_all_datasources(&self) -> Result<bool> {
        self.can_access(ALL_DATASOURCE_ACCESS, ALL_DATASOURCE_ACCESS)
    }

    pub fn can_access_all_databases(&self) -> Result<bool> {
        self.can_access(ALL_DATABASE_ACCESS, ALL_DATABASE_ACCESS)
    }

    /// Full access to a database: a universal grant or `database_access` on it.
    pub fn can_access_database(&self, database: &Database) -> Result<bool> {
        let perm = database.perm.clone().unwrap_or_else(|| database.derive_perm());
        Ok(self.can_access_all_datasources()?
            || self.can_access_all_databases()?
            || self.can_access(DATABASE_ACCESS, &perm)?)
    }

    /// Full access to the schema a datasource lives in.
    pub fn can_access_schema(&self, datasource: &Datasource) -> Result<bool> {
        Ok(self.can_access_all_datasources()?
            || self.probe(Probe::DatabaseGrant, datasource)?
            || self.probe(Probe::SchemaGrant, datasource)?)
    }

    pub fn can_access_datasource(&self, datasource: &Datasource) -> Result<bool> {
        allowed(self.raise_for_access(AccessTarget::Datasource(datasource)))
    }

    pub fn can_access_table(&self, database: &Database, table: &Table) -> Result<bool> {
        allowed(self.raise_for_access(AccessTarget::Table { database, table }))
    }

    /// Evaluates a single probe in isolation.
    pub fn probe(&self, probe: Probe, datasource: &Datasource) -> Result<bool> {
        match probe {
            Probe::UniversalGrant => self.can_access_all_datasources(),
            Probe::DatabaseGrant => match datasource.database_id {
                Some(id) => match self.catalog.database(id)? {
                    Some(database) => self.can_access_database(&database),
                    None => Ok(false),
                },
                None => Ok(false),
            },
            Probe::SchemaGrant => match &datasource.schema_perm {
                Some(schema_perm) => self.can_access(SCHEMA_ACCESS, schema_perm),
                None => Ok(false),
            },
            Probe::DirectGrant => match &datasource.perm {
                Some(perm) => self.can_access(DATASOURCE_ACCESS, perm),
                None => Ok(false),
            },
            Probe::DashboardRelationship => {
                if self.settings.dashboard_rbac || self.is_guest() {
                    self.can_access_based_on_dashboard(datasource)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// The first probe, in [`Probe::ORDER`], that grants the datasource.
    pub fn granting_probe(&self, datasource: &Datasource) -> Result<Option<Probe>> {
        for probe in Probe::ORDER {
            if self.probe(probe, datasource)? {
                return Ok(Some(probe));
            }
        }
        Ok(None)
    }

    /// Fails unless the principal may read `target`.
    pub fn raise_for_access(&self, target: AccessTarget<'_>) -> Result<()> {
        match target {
            AccessTarget::Datasource(datasource) => self.raise_for_datasource(datasource),
            AccessTarget::Table { database, table } => {
                if self.can_access_database(database)? {
                    debug!(database = %database.name, "Table access granted by database grant");
                    return Ok(());
                }
                self.raise_for_tables(database, BTreeSet::from([table.clone()]))
            }
            AccessTarget::Query {
                database,
                sql,
                schema,
            } => {
                if self.can_access_database(database)? {
                    debug!(database = %database.name, "Query access granted by database grant");
                    return Ok(());
                }
                let tables = self.extractor.extract_tables(sql, schema)?;
                self.raise_for_tables(database, tables)
            }
        }
    }

    fn raise_for_tables(&self, database: &Database, tables: BTreeSet<Table>) -> Result<()> {
        let mut denied = Vec::new();
        for table in tables {
            if !self.can_reach_table(database, &table)? {
                denied.push(table);
            }
        }

        if denied.is_empty() {
            debug!(database = %database.name, "Table access granted");
            return Ok(());
        }

        warn!(
            database = %database.name,
            denied = ?denied.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Table access denied"
        );
        Err(SecurityError::TableAccessDenied(ErrorObject::table_access(
            &denied,
            self.link(),
        )))
    }

    // Schema grant, or a grant on any datasource backing the table.
    fn can_reach_table(&self, database: &Database, table: &Table) -> Result<bool> {
        if let Some(schema_perm) = perms::schema_perm(&database.name, table.schema.as_deref())
            && self.can_access(SCHEMA_ACCESS, &schema_perm)?
        {
            return Ok(true);
        }

        for datasource in
            self.catalog
                .datasources_by_name(database.id, &table.table, table.schema.as_deref())?
        {
            if let Some(perm) = &datasource.perm
                && self.can_access(DATASOURCE_ACCESS, perm)?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn raise_for_datasource(&self, datasource: &Datasource) -> Result<()> {
        if let Some(probe) = self.granting_probe(datasource)? {
            debug!(datasource = %datasource.id, probe = ?probe, "Datasource access granted");
            return Ok(());
        }
        warn!(datasource = %datasource.id, name = %datasource.name(), "Datasource access denied");
        Err(SecurityError::DatasourceAccessDenied(
            ErrorObject::datasource_access(datasource, self.link()),
        ))
    }

    /// Whether some dashboard the principal may open charts this datasource.
    pub fn can_access_based_on_dashboard(&self, datasource: &Datasource) -> Result<bool> {
        for dashboard in self.catalog.dashboards()? {
            let mut charts_datasource = false;
            for chart_id in &dashboard.chart_ids {
                if let Some(chart) = self.catalog.chart(*chart_id)?
                    && chart.datasource_id == datasource.id
                {
                    charts_datasource = true;
                    break;
                }
            }
            if charts_datasource && self.has_dashboard_access(&dashboard)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ------------------------------------------------------------------------
    // Dashboards and activity
    // ------------------------------------------------------------------------

    /// Relationship-only dashboard check; PVM grants play no part.
    pub fn has_dashboard_access(&self, dashboard: &Dashboard) -> Result<bool> {
        if let Some(guest) = self.guest() {
            let embedded = self.catalog.embedded_for_dashboard(dashboard.id)?;
            return Ok(embedded.is_some() && guest.has_access(dashboard, embedded.as_ref()));
        }

        if self.is_admin()? {
            return Ok(true);
        }
        if let Some(user_id) = self.principal.user_id()
            && dashboard.owner_ids.contains(&user_id)
        {
            return Ok(true);
        }
        if dashboard.published {
            return self.has_dashboard_rbac_access(dashboard);
        }
        Ok(dashboard.role_ids.is_empty())
    }

    // Falls open when role-based dashboard access is disabled.
    fn has_dashboard_rbac_access(&self, dashboard: &Dashboard) -> Result<bool> {
        if !self.settings.dashboard_rbac {
            return Ok(true);
        }
        let held: HashSet<RoleId> = self.user_roles()?.iter().map(|r| r.id).collect();
        Ok(dashboard.role_ids.iter().any(|id| held.contains(id)))
    }

    pub fn can_access_dashboard(&self, dashboard: &Dashboard) -> Result<()> {
        if self.has_dashboard_access(dashboard)? {
            return Ok(());
        }
        warn!(dashboard = %dashboard.id, "Dashboard access denied");
        Err(SecurityError::DashboardAccessDenied(
            ErrorObject::dashboard_access(),
        ))
    }

    /// Fails if the principal may not read `user_id`'s activity data.
    pub fn raise_for_user_activity_access(&self, user_id: UserId) -> Result<()> {
        let permitted = match self.principal.user_id() {
            Some(own) => self.settings.broad_activity_access || own == user_id,
            None => false,
        };
        if permitted {
            return Ok(());
        }
        warn!(user = %user_id, "User activity access denied");
        Err(SecurityError::UserActivityAccessDenied(
            ErrorObject::user_activity_access(),
        ))
    }

    // ------------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------------

    /// Resource names the principal holds `permission` on.
    pub fn user_view_menu_names(&self, permission: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .grants()?
            .pairs
            .iter()
            .filter(|(p, _)| p == permission)
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn datasources_by_permissions(
        &self,
        datasources: Vec<Datasource>,
    ) -> Result<Vec<Datasource>> {
        let user_perms = self.user_view_menu_names(DATASOURCE_ACCESS)?;
        let schema_perms = self.user_view_menu_names(SCHEMA_ACCESS)?;
        Ok(datasources
            .into_iter()
            .filter(|d| {
                d.perm.as_ref().is_some_and(|p| user_perms.contains(p))
                    || d.schema_perm.as_ref().is_some_and(|p| schema_perms.contains(p))
            })
            .collect())
    }

    /// Datasources granted explicitly or through a fully accessible database.
    pub fn user_datasources(&self) -> Result<Vec<Datasource>> {
        let all = self.catalog.datasources()?;
        let mut found: BTreeMap<_, Datasource> = self
            .datasources_by_permissions(all.clone())?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();

        for database in self.catalog.databases()? {
            if !self.can_access_database(&database)? {
                continue;
            }
            for datasource in all.iter().filter(|d| d.database_id == Some(database.id)) {
                found.entry(datasource.id).or_insert_with(|| datasource.clone());
            }
        }
        Ok(found.into_values().collect())
    }

    /// The subset of `schemas` in `database` the principal can reach.
    ///
    /// With `hierarchical`, full database access returns every schema.
    pub fn schemas_accessible_by_user(
        &self,
        database: &Database,
        schemas: &[String],
        hierarchical: bool,
    ) -> Result<Vec<String>> {
        if hierarchical && self.can_access_database(database)? {
            return Ok(schemas.to_vec());
        }

        let prefix = format!("[{}].", database.name);
        let mut accessible: HashSet<String> = self
            .user_view_menu_names(SCHEMA_ACCESS)?
            .iter()
            .filter(|s| s.starts_with(&prefix))
            .filter_map(|s| perms::unpack_database_and_schema(s))
            .map(|unpacked| unpacked.schema)
            .collect();

        let datasource_perms = self.user_view_menu_names(DATASOURCE_ACCESS)?;
        if !datasource_perms.is_empty() {
            for datasource in self.catalog.datasources()? {
                if datasource.database_id != Some(database.id) {
                    continue;
                }
                let granted = datasource
                    .perm
                    .as_ref()
                    .is_some_and(|p| datasource_perms.contains(p));
                if granted && let Some(schema) = datasource.schema() {
                    accessible.insert(schema.to_string());
                }
            }
        }

        Ok(schemas
            .iter()
            .filter(|s| accessible.contains(*s))
            .cloned()
            .collect())
    }

    /// The subset of `tables` in `database` the principal can reach.
    ///
    /// `schema` is the fallback for tables given without one.
    pub fn datasources_accessible_by_user(
        &self,
        database: &Database,
        tables: &[Table],
        schema: Option<&str>,
    ) -> Result<Vec<Table>> {
        if self.can_access_database(database)? {
            return Ok(tables.to_vec());
        }

        if let Some(schema_perm) = perms::schema_perm(&database.name, schema)
            && self.can_access(SCHEMA_ACCESS, &schema_perm)?
        {
            return Ok(tables.to_vec());
        }

        let in_database: Vec<Datasource> = self
            .catalog
            .datasources()?
            .into_iter()
            .filter(|d| d.database_id == Some(database.id))
            .collect();
        let granted = self.datasources_by_permissions(in_database)?;

        if let Some(schema) = schema.filter(|s| !s.is_empty()) {
            let names: HashSet<&str> = granted
                .iter()
                .filter(|d| d.schema() == Some(schema))
                .map(|d| d.table_name.as_str())
                .collect();
            return Ok(tables
                .iter()
                .filter(|t| names.contains(t.table.as_str()))
                .cloned()
                .collect());
        }

        Ok(tables
            .iter()
            .filter(|t| {
                granted
                    .iter()
                    .any(|d| d.table_name == t.table && d.schema() == t.schema.as_deref())
            })
            .cloned()
            .collect())
    }
}
