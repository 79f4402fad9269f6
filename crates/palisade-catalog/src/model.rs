//! Idempotent permission-model operations.
//!
//! Every creator returns the existing entity when one is already present, so
//! synchronization passes can be re-run without duplicating rows.

use std::collections::HashSet;

use tracing::info;

use crate::entities::{Permission, PermissionResource, Resource, Role};
use crate::error::Result;
use crate::perms::{DATABASE_ACCESS, DATASOURCE_ACCESS, SCHEMA_ACCESS};
use crate::store::CatalogMut;

/// Permission-model operations available on any writable catalog.
pub trait PermissionModel: CatalogMut {
    /// Returns the named permission, creating it if absent.
    fn add_permission(&mut self, name: &str) -> Result<Permission> {
        match self.find_permission(name)? {
            Some(permission) => Ok(permission),
            None => self.insert_permission(name),
        }
    }

    /// Returns the named resource, creating it if absent.
    fn add_resource(&mut self, name: &str) -> Result<Resource> {
        match self.find_resource(name)? {
            Some(resource) => Ok(resource),
            None => self.insert_resource(name),
        }
    }

    /// Returns the (permission, resource) pair, creating any missing side.
    fn find_or_create_pvm(
        &mut self,
        permission: &str,
        resource: &str,
    ) -> Result<PermissionResource> {
        let permission = self.add_permission(permission)?;
        let resource = self.add_resource(resource)?;
        match self.find_pvm(permission.id, resource.id)? {
            Some(pvm) => Ok(pvm),
            None => self.insert_pvm(permission.id, resource.id),
        }
    }

    /// Returns the named role, creating it empty if absent.
    fn add_role(&mut self, name: &str) -> Result<Role> {
        match self.find_role(name)? {
            Some(role) => Ok(role),
            None => {
                info!(role = %name, "Added role");
                self.insert_role(name)
            }
        }
    }

    /// Deletes every pair whose permission or resource no longer exists.
    ///
    /// Returns the number of deleted pairs.
    fn clean_faulty_pvms(&mut self) -> Result<usize> {
        info!("Cleaning faulty perms");
        let mut faulty = Vec::new();
        for pvm in self.pvms()? {
            if self.resolve_pvm(&pvm)?.is_none() {
                faulty.push(pvm.id);
            }
        }

        let deleted = self.delete_pvms(&faulty)?;
        if deleted > 0 {
            info!(deleted, "Deleted faulty permissions");
        }
        Ok(deleted)
    }

    /// Creates any missing access pair for every database and datasource.
    ///
    /// Returns the number of pairs created.
    fn create_missing_perms(&mut self) -> Result<usize> {
        info!("Fetching a set of all perms to lookup which ones are missing");
        let mut existing: HashSet<(String, String)> = self
            .resolved_pvms()?
            .into_iter()
            .map(|p| (p.permission, p.resource))
            .collect();

        let mut wanted: Vec<(&'static str, String)> = Vec::new();

        info!("Creating missing datasource permissions.");
        let databases = self.databases()?;
        for datasource in self.datasources()? {
            let Some(database) = databases
                .iter()
                .find(|d| Some(d.id) == datasource.database_id)
            else {
                continue;
            };
            wanted.push((DATASOURCE_ACCESS, datasource.derive_perm(database)));
            if let Some(schema_perm) = datasource.derive_schema_perm(database) {
                wanted.push((SCHEMA_ACCESS, schema_perm));
            }
        }

        info!("Creating missing database permissions.");
        for database in &databases {
            wanted.push((DATABASE_ACCESS, database.derive_perm()));
        }

        let mut created = 0;
        for (permission, resource) in wanted {
            if existing.insert((permission.to_string(), resource.clone())) {
                self.find_or_create_pvm(permission, &resource)?;
                created += 1;
            }
        }
        Ok(created)
    }
}

impl<T: CatalogMut + ?Sized> PermissionModel for T {}
