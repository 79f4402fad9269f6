//! In-memory entity store.
//!
//! Transactions run against a private copy of the state that replaces the
//! shared state only when the closure succeeds, so a failed pass leaves no
//! partial writes behind. Writers are serialized by the lock.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use palisade_types::{
    ChartId, DashboardId, DatabaseId, DatasourceId, PermissionId, PvmId, ResourceId, RlsFilterId,
    RoleId, UserId,
};
use uuid::Uuid;

use crate::entities::{
    Chart, Dashboard, Database, Datasource, EmbeddedDashboard, Permission, PermissionResource,
    Resource, Role, RowLevelSecurityFilter, User,
};
use crate::error::{Result, StoreError};
use crate::hooks::{BeforeCommit, HookRegistry, PermissionSync};
use crate::store::{Catalog, CatalogMut, Store};

/// Plain-data catalog state.
#[derive(Debug, Clone, Default)]
pub struct CatalogState {
    next_id: u64,
    permissions: BTreeMap<PermissionId, Permission>,
    resources: BTreeMap<ResourceId, Resource>,
    pvms: BTreeMap<PvmId, PermissionResource>,
    roles: BTreeMap<RoleId, Role>,
    users: BTreeMap<UserId, User>,
    databases: BTreeMap<DatabaseId, Database>,
    datasources: BTreeMap<DatasourceId, Datasource>,
    charts: BTreeMap<ChartId, Chart>,
    dashboards: BTreeMap<DashboardId, Dashboard>,
    embedded: BTreeMap<Uuid, EmbeddedDashboard>,
    rls_filters: BTreeMap<RlsFilterId, RowLevelSecurityFilter>,
}

impl CatalogState {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl Catalog for CatalogState {
    fn permission(&self, id: PermissionId) -> Result<Option<Permission>> {
        Ok(self.permissions.get(&id).cloned())
    }

    fn find_permission(&self, name: &str) -> Result<Option<Permission>> {
        Ok(self.permissions.values().find(|p| p.name == name).cloned())
    }

    fn resource(&self, id: ResourceId) -> Result<Option<Resource>> {
        Ok(self.resources.get(&id).cloned())
    }

    fn find_resource(&self, name: &str) -> Result<Option<Resource>> {
        Ok(self.resources.values().find(|r| r.name == name).cloned())
    }

    fn pvm(&self, id: PvmId) -> Result<Option<PermissionResource>> {
        Ok(self.pvms.get(&id).copied())
    }

    fn find_pvm(
        &self,
        permission_id: PermissionId,
        resource_id: ResourceId,
    ) -> Result<Option<PermissionResource>> {
        Ok(self
            .pvms
            .values()
            .find(|p| p.permission_id == permission_id && p.resource_id == resource_id)
            .copied())
    }

    fn pvms(&self) -> Result<Vec<PermissionResource>> {
        Ok(self.pvms.values().copied().collect())
    }

    fn role(&self, id: RoleId) -> Result<Option<Role>> {
        Ok(self.roles.get(&id).cloned())
    }

    fn find_role(&self, name: &str) -> Result<Option<Role>> {
        Ok(self.roles.values().find(|r| r.name == name).cloned())
    }

    fn roles(&self) -> Result<Vec<Role>> {
        Ok(self.roles.values().cloned().collect())
    }

    fn user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.get(&id).cloned())
    }

    fn database(&self, id: DatabaseId) -> Result<Option<Database>> {
        Ok(self.databases.get(&id).cloned())
    }

    fn databases(&self) -> Result<Vec<Database>> {
        Ok(self.databases.values().cloned().collect())
    }

    fn datasource(&self, id: DatasourceId) -> Result<Option<Datasource>> {
        Ok(self.datasources.get(&id).cloned())
    }

    fn datasources(&self) -> Result<Vec<Datasource>> {
        Ok(self.datasources.values().cloned().collect())
    }

    fn chart(&self, id: ChartId) -> Result<Option<Chart>> {
        Ok(self.charts.get(&id).cloned())
    }

    fn dashboard(&self, id: DashboardId) -> Result<Option<Dashboard>> {
        Ok(self.dashboards.get(&id).cloned())
    }

    fn dashboards(&self) -> Result<Vec<Dashboard>> {
        Ok(self.dashboards.values().cloned().collect())
    }

    fn embedded_dashboard(&self, uuid: &Uuid) -> Result<Option<EmbeddedDashboard>> {
        Ok(self.embedded.get(uuid).cloned())
    }

    fn embedded_for_dashboard(&self, id: DashboardId) -> Result<Option<EmbeddedDashboard>> {
        Ok(self
            .embedded
            .values()
            .find(|e| e.dashboard_id == id)
            .cloned())
    }

    fn rls_filters(&self) -> Result<Vec<RowLevelSecurityFilter>> {
        Ok(self.rls_filters.values().cloned().collect())
    }
}

impl CatalogMut for CatalogState {
    fn insert_permission(&mut self, name: &str) -> Result<Permission> {
        if self.find_permission(name)?.is_some() {
            return Err(StoreError::Duplicate {
                kind: "permission",
                key: name.to_string(),
            });
        }
        let permission = Permission {
            id: PermissionId::new(self.allocate()),
            name: name.to_string(),
        };
        self.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    fn insert_resource(&mut self, name: &str) -> Result<Resource> {
        if self.find_resource(name)?.is_some() {
            return Err(StoreError::Duplicate {
                kind: "resource",
                key: name.to_string(),
            });
        }
        let resource = Resource {
            id: ResourceId::new(self.allocate()),
            name: name.to_string(),
        };
        self.resources.insert(resource.id, resource.clone());
        Ok(resource)
    }

    fn insert_pvm(
        &mut self,
        permission_id: PermissionId,
        resource_id: ResourceId,
    ) -> Result<PermissionResource> {
        if self.find_pvm(permission_id, resource_id)?.is_some() {
            return Err(StoreError::Duplicate {
                kind: "permission view",
                key: format!("{permission_id}/{resource_id}"),
            });
        }
        let pvm = PermissionResource {
            id: PvmId::new(self.allocate()),
            permission_id,
            resource_id,
        };
        self.pvms.insert(pvm.id, pvm);
        Ok(pvm)
    }

    fn delete_pvms(&mut self, ids: &[PvmId]) -> Result<usize> {
        let mut deleted = 0;
        for id in ids {
            if self.pvms.remove(id).is_some() {
                deleted += 1;
            }
        }
        for role in self.roles.values_mut() {
            role.pvm_ids.retain(|id| !ids.contains(id));
        }
        Ok(deleted)
    }

    fn delete_permission(&mut self, id: PermissionId) -> Result<bool> {
        Ok(self.permissions.remove(&id).is_some())
    }

    fn delete_resource(&mut self, id: ResourceId) -> Result<bool> {
        Ok(self.resources.remove(&id).is_some())
    }

    fn insert_role(&mut self, name: &str) -> Result<Role> {
        if self.find_role(name)?.is_some() {
            return Err(StoreError::Duplicate {
                kind: "role",
                key: name.to_string(),
            });
        }
        let role = Role {
            id: RoleId::new(self.allocate()),
            name: name.to_string(),
            pvm_ids: BTreeSet::new(),
        };
        self.roles.insert(role.id, role.clone());
        Ok(role)
    }

    fn set_role_pvms(&mut self, role_id: RoleId, pvm_ids: BTreeSet<PvmId>) -> Result<()> {
        if let Some(missing) = pvm_ids.iter().find(|id| !self.pvms.contains_key(id)) {
            return Err(StoreError::not_found("permission view", missing));
        }
        let role = self
            .roles
            .get_mut(&role_id)
            .ok_or_else(|| StoreError::not_found("role", role_id))?;
        role.pvm_ids = pvm_ids;
        Ok(())
    }

    fn put_user(&mut self, user: User) -> Result<()> {
        self.users.insert(user.id, user);
        Ok(())
    }

    fn put_database(&mut self, database: Database) -> Result<()> {
        self.databases.insert(database.id, database);
        Ok(())
    }

    fn put_datasource(&mut self, datasource: Datasource) -> Result<()> {
        self.datasources.insert(datasource.id, datasource);
        Ok(())
    }

    fn update_database_perm(&mut self, id: DatabaseId, perm: &str) -> Result<()> {
        let database = self
            .databases
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("database", id))?;
        database.perm = Some(perm.to_string());
        Ok(())
    }

    fn update_datasource_perms(
        &mut self,
        id: DatasourceId,
        perm: &str,
        schema_perm: Option<&str>,
    ) -> Result<()> {
        let datasource = self
            .datasources
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("datasource", id))?;
        datasource.perm = Some(perm.to_string());
        datasource.schema_perm = schema_perm.map(str::to_string);
        Ok(())
    }

    fn put_chart(&mut self, chart: Chart) -> Result<()> {
        self.charts.insert(chart.id, chart);
        Ok(())
    }

    fn put_dashboard(&mut self, dashboard: Dashboard) -> Result<()> {
        self.dashboards.insert(dashboard.id, dashboard);
        Ok(())
    }

    fn put_embedded_dashboard(&mut self, embedded: EmbeddedDashboard) -> Result<()> {
        self.embedded.insert(embedded.uuid, embedded);
        Ok(())
    }

    fn put_rls_filter(&mut self, filter: RowLevelSecurityFilter) -> Result<()> {
        self.rls_filters.insert(filter.id, filter);
        Ok(())
    }
}

/// Thread-safe in-memory [`Store`].
///
/// [`PermissionSync`] is registered by default so saved databases and
/// datasources always carry their derived permission strings.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<CatalogState>,
    hooks: HookRegistry,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::without_hooks().with_hook(PermissionSync::shared())
    }

    /// An empty store with no before-commit hooks.
    pub fn without_hooks() -> Self {
        Self {
            state: RwLock::new(CatalogState::new()),
            hooks: HookRegistry::new(),
        }
    }

    /// Registers a before-commit hook for database/datasource writes.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn BeforeCommit>) -> Self {
        self.hooks.register(hook);
        self
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn read<T, E>(
        &self,
        f: impl FnOnce(&dyn Catalog) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
    {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        f(&*state)
    }

    fn transaction<T, E>(
        &self,
        f: impl FnOnce(&mut dyn CatalogMut) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut working = state.clone();
        let value = f(&mut working)?;
        *state = working;
        Ok(value)
    }

    fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }
}
