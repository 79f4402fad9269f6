//! Entity source abstraction.
//!
//! [`Catalog`] is the read side every evaluation path consumes, [`CatalogMut`]
//! adds the writes used by synchronization and entity persistence, and
//! [`Store`] scopes both to a read snapshot or a transaction.

use std::collections::BTreeSet;

use palisade_types::{
    ChartId, DashboardId, DatabaseId, DatasourceId, PermissionId, PvmId, ResourceId, RoleId,
    UserId,
};
use uuid::Uuid;

use crate::entities::{
    Chart, Dashboard, Database, Datasource, EmbeddedDashboard, Permission, PermissionResource,
    Resource, ResolvedPvm, Role, RowLevelSecurityFilter, User,
};
use crate::error::{Result, StoreError};
use crate::hooks::{EntityRef, HookRegistry};

/// Read access to the entity catalog.
pub trait Catalog {
    fn permission(&self, id: PermissionId) -> Result<Option<Permission>>;
    fn find_permission(&self, name: &str) -> Result<Option<Permission>>;
    fn resource(&self, id: ResourceId) -> Result<Option<Resource>>;
    fn find_resource(&self, name: &str) -> Result<Option<Resource>>;
    fn pvm(&self, id: PvmId) -> Result<Option<PermissionResource>>;
    fn find_pvm(
        &self,
        permission_id: PermissionId,
        resource_id: ResourceId,
    ) -> Result<Option<PermissionResource>>;
    fn pvms(&self) -> Result<Vec<PermissionResource>>;

    fn role(&self, id: RoleId) -> Result<Option<Role>>;
    fn find_role(&self, name: &str) -> Result<Option<Role>>;
    fn roles(&self) -> Result<Vec<Role>>;
    fn user(&self, id: UserId) -> Result<Option<User>>;

    fn database(&self, id: DatabaseId) -> Result<Option<Database>>;
    fn databases(&self) -> Result<Vec<Database>>;
    fn datasource(&self, id: DatasourceId) -> Result<Option<Datasource>>;
    fn datasources(&self) -> Result<Vec<Datasource>>;
    fn chart(&self, id: ChartId) -> Result<Option<Chart>>;
    fn dashboard(&self, id: DashboardId) -> Result<Option<Dashboard>>;
    fn dashboards(&self) -> Result<Vec<Dashboard>>;
    fn embedded_dashboard(&self, uuid: &Uuid) -> Result<Option<EmbeddedDashboard>>;
    fn embedded_for_dashboard(&self, id: DashboardId) -> Result<Option<EmbeddedDashboard>>;
    fn rls_filters(&self) -> Result<Vec<RowLevelSecurityFilter>>;

    /// Resolves both sides of a pair; `None` if either side is missing.
    fn resolve_pvm(&self, pvm: &PermissionResource) -> Result<Option<ResolvedPvm>> {
        let Some(permission) = self.permission(pvm.permission_id)? else {
            return Ok(None);
        };
        let Some(resource) = self.resource(pvm.resource_id)? else {
            return Ok(None);
        };
        Ok(Some(ResolvedPvm {
            id: pvm.id,
            permission: permission.name,
            resource: resource.name,
        }))
    }

    /// Every pair whose permission and resource both exist.
    fn resolved_pvms(&self) -> Result<Vec<ResolvedPvm>> {
        let mut resolved = Vec::new();
        for pvm in self.pvms()? {
            if let Some(r) = self.resolve_pvm(&pvm)? {
                resolved.push(r);
            }
        }
        Ok(resolved)
    }

    /// Datasources in `database_id` named `table_name`, narrowed to `schema` when given.
    fn datasources_by_name(
        &self,
        database_id: DatabaseId,
        table_name: &str,
        schema: Option<&str>,
    ) -> Result<Vec<Datasource>> {
        Ok(self
            .datasources()?
            .into_iter()
            .filter(|d| d.database_id == Some(database_id) && d.table_name == table_name)
            .filter(|d| schema.is_none_or(|s| d.schema() == Some(s)))
            .collect())
    }

    /// Filters attached to the given table.
    fn rls_filters_for_table(&self, table_id: DatasourceId) -> Result<Vec<RowLevelSecurityFilter>> {
        Ok(self
            .rls_filters()?
            .into_iter()
            .filter(|f| f.table_ids.contains(&table_id))
            .collect())
    }
}

/// Write access to the entity catalog.
///
/// `insert_*` operations enforce uniqueness and fail with
/// [`StoreError::Duplicate`]; the idempotent variants live on
/// [`PermissionModel`](crate::model::PermissionModel).
pub trait CatalogMut: Catalog {
    fn insert_permission(&mut self, name: &str) -> Result<Permission>;
    fn insert_resource(&mut self, name: &str) -> Result<Resource>;
    fn insert_pvm(
        &mut self,
        permission_id: PermissionId,
        resource_id: ResourceId,
    ) -> Result<PermissionResource>;
    /// Deletes the given pairs and their role assignments.
    fn delete_pvms(&mut self, ids: &[PvmId]) -> Result<usize>;
    /// Deletes a permission row without touching the pairs that reference it.
    fn delete_permission(&mut self, id: PermissionId) -> Result<bool>;
    /// Deletes a resource row without touching the pairs that reference it.
    fn delete_resource(&mut self, id: ResourceId) -> Result<bool>;

    fn insert_role(&mut self, name: &str) -> Result<Role>;
    fn set_role_pvms(&mut self, role_id: RoleId, pvm_ids: BTreeSet<PvmId>) -> Result<()>;
    fn put_user(&mut self, user: User) -> Result<()>;

    fn put_database(&mut self, database: Database) -> Result<()>;
    fn put_datasource(&mut self, datasource: Datasource) -> Result<()>;
    fn update_database_perm(&mut self, id: DatabaseId, perm: &str) -> Result<()>;
    fn update_datasource_perms(
        &mut self,
        id: DatasourceId,
        perm: &str,
        schema_perm: Option<&str>,
    ) -> Result<()>;

    fn put_chart(&mut self, chart: Chart) -> Result<()>;
    fn put_dashboard(&mut self, dashboard: Dashboard) -> Result<()>;
    fn put_embedded_dashboard(&mut self, embedded: EmbeddedDashboard) -> Result<()>;
    fn put_rls_filter(&mut self, filter: RowLevelSecurityFilter) -> Result<()>;
}

/// A transactional entity store.
pub trait Store: Send + Sync {
    /// Runs `f` against a consistent read view.
    fn read<T, E>(
        &self,
        f: impl FnOnce(&dyn Catalog) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<StoreError>;

    /// Runs `f` in a transaction that commits only if `f` returns `Ok`.
    fn transaction<T, E>(
        &self,
        f: impl FnOnce(&mut dyn CatalogMut) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<StoreError>;

    /// Callbacks run inside the transaction of every database/datasource write.
    fn hooks(&self) -> &HookRegistry;

    /// Persists a database and runs the before-commit hooks in the same transaction.
    fn save_database(&self, database: Database) -> Result<()> {
        let entity = EntityRef::Database(database.id);
        self.transaction(|tx| {
            tx.put_database(database)?;
            self.hooks().run(tx, entity)
        })
    }

    /// Persists a datasource and runs the before-commit hooks in the same transaction.
    fn save_datasource(&self, datasource: Datasource) -> Result<()> {
        let entity = EntityRef::Datasource(datasource.id);
        self.transaction(|tx| {
            tx.put_datasource(datasource)?;
            self.hooks().run(tx, entity)
        })
    }
}
