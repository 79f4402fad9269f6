//! Before-commit callbacks for hierarchical resource writes.
//!
//! Databases and datasources carry stored permission strings that must match
//! their identity. [`PermissionSync`] recomputes them inside the same
//! transaction as the write that triggered it, so no reader ever observes a
//! stale string.

use std::sync::Arc;

use palisade_types::{DatabaseId, DatasourceId};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::model::PermissionModel;
use crate::perms::{DATABASE_ACCESS, DATASOURCE_ACCESS, SCHEMA_ACCESS};
use crate::store::CatalogMut;

/// The entity whose write triggered a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Database(DatabaseId),
    Datasource(DatasourceId),
}

/// A callback executed inside the transaction of an entity write.
///
/// Returning `Err` aborts the surrounding transaction.
pub trait BeforeCommit: Send + Sync {
    fn before_commit(&self, tx: &mut dyn CatalogMut, entity: EntityRef) -> Result<()>;
}

/// Ordered set of registered hooks.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn BeforeCommit>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn BeforeCommit>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every hook in registration order.
    pub fn run(&self, tx: &mut dyn CatalogMut, entity: EntityRef) -> Result<()> {
        for hook in &self.hooks {
            hook.before_commit(tx, entity)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Repairs stored permission strings and ensures their access pairs exist.
///
/// A datasource without a resolvable database is logged and skipped; it must
/// not block the write that triggered the hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionSync;

impl PermissionSync {
    pub fn shared() -> Arc<dyn BeforeCommit> {
        Arc::new(PermissionSync)
    }

    fn sync_database(tx: &mut dyn CatalogMut, id: DatabaseId) -> Result<()> {
        let database = tx
            .database(id)?
            .ok_or_else(|| StoreError::not_found("database", id))?;
        let perm = database.derive_perm();

        tx.find_or_create_pvm(DATABASE_ACCESS, &perm)?;
        if database.perm.as_deref() == Some(perm.as_str()) {
            return Ok(());
        }

        debug!(database = %id, perm = %perm, "Repairing database permission string");
        tx.update_database_perm(id, &perm)?;

        // Datasource strings embed the database name.
        let children: Vec<DatasourceId> = tx
            .datasources()?
            .into_iter()
            .filter(|ds| ds.database_id == Some(id))
            .map(|ds| ds.id)
            .collect();
        for child in children {
            Self::sync_datasource(tx, child)?;
        }
        Ok(())
    }

    fn sync_datasource(tx: &mut dyn CatalogMut, id: DatasourceId) -> Result<()> {
        let datasource = tx
            .datasource(id)?
            .ok_or_else(|| StoreError::not_found("datasource", id))?;

        let database = match datasource.database_id {
            Some(database_id) => tx.database(database_id)?,
            None => None,
        };
        let Some(database) = database else {
            warn!(datasource = %id, "Dataset has no database refusing to set permission");
            return Ok(());
        };

        let perm = datasource.derive_perm(&database);
        let schema_perm = datasource.derive_schema_perm(&database);

        if datasource.perm.as_deref() != Some(perm.as_str())
            || datasource.schema_perm != schema_perm
        {
            debug!(datasource = %id, perm = %perm, "Repairing datasource permission strings");
            tx.update_datasource_perms(id, &perm, schema_perm.as_deref())?;
        }

        tx.find_or_create_pvm(DATASOURCE_ACCESS, &perm)?;
        if let Some(schema_perm) = schema_perm {
            tx.find_or_create_pvm(SCHEMA_ACCESS, &schema_perm)?;
        }
        Ok(())
    }
}

impl BeforeCommit for PermissionSync {
    fn before_commit(&self, tx: &mut dyn CatalogMut, entity: EntityRef) -> Result<()> {
        match entity {
            EntityRef::Database(id) => Self::sync_database(tx, id),
            EntityRef::Datasource(id) => Self::sync_datasource(tx, id),
        }
    }
}
