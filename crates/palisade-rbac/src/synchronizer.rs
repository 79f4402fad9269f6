//! Built-in role synchronization.
//!
//! The only path that mutates built-in roles. A pass compiles every rule up
//! front, so a malformed pattern aborts before anything is written, then
//! recomputes all roles in a single transaction. Concurrent passes are not
//! coordinated here; callers serialize them.

use std::collections::{BTreeMap, BTreeSet};

use palisade_catalog::perms::{
    ALL_DATABASE_ACCESS, ALL_DATASOURCE_ACCESS, ALL_QUERY_ACCESS, is_data_access_permission,
};
use palisade_catalog::{CatalogMut, PermissionModel, Store};
use palisade_types::PvmId;
use tracing::info;

use crate::error::{Result, SecurityError};
use crate::roles::{ClassificationPolicy, CompiledRule, RoleDefinition};

/// Pairs every synchronization pass guarantees exist.
pub const CUSTOM_PERMISSIONS: [(&str, &str); 5] = [
    (ALL_DATASOURCE_ACCESS, ALL_DATASOURCE_ACCESS),
    (ALL_DATABASE_ACCESS, ALL_DATABASE_ACCESS),
    (ALL_QUERY_ACCESS, ALL_QUERY_ACCESS),
    ("can_share_dashboard", "Palisade"),
    ("can_share_chart", "Palisade"),
];

/// Outcome of one synchronization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Pair count assigned to each built-in role.
    pub roles: BTreeMap<String, usize>,
    pub missing_perms_created: usize,
    pub faulty_pvms_deleted: usize,
}

/// Recomputes built-in roles from the current pair universe.
#[derive(Debug, Clone)]
pub struct RoleSynchronizer {
    policy: ClassificationPolicy,
    definitions: Vec<RoleDefinition>,
    public_role: Option<String>,
    public_role_like: Option<String>,
}

impl Default for RoleSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleSynchronizer {
    /// A synchronizer for the five predicate-defined built-in roles.
    pub fn new() -> Self {
        Self {
            policy: ClassificationPolicy::default(),
            definitions: RoleDefinition::builtins(),
            public_role: None,
            public_role_like: None,
        }
    }

    pub fn with_policy(mut self, policy: ClassificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Adds a built-in role, replacing any definition with the same name.
    pub fn with_definition(mut self, definition: RoleDefinition) -> Self {
        match self.definitions.iter_mut().find(|d| d.name == definition.name) {
            Some(existing) => *existing = definition,
            None => self.definitions.push(definition),
        }
        self
    }

    /// Copies `template` onto `public_role` (merging) at the end of every pass.
    pub fn with_public_role_like(
        mut self,
        public_role: Option<String>,
        template: Option<String>,
    ) -> Self {
        self.public_role = public_role;
        self.public_role_like = template;
        self
    }

    pub fn policy(&self) -> &ClassificationPolicy {
        &self.policy
    }

    pub fn definitions(&self) -> &[RoleDefinition] {
        &self.definitions
    }

    fn compile(&self) -> Result<Vec<(&str, CompiledRule)>> {
        self.definitions
            .iter()
            .map(|d| Ok((d.name.as_str(), d.compile()?)))
            .collect()
    }

    /// Runs a full synchronization pass.
    ///
    /// Custom permissions, built-in roles, the public role template and the
    /// missing-permission backfill commit together; faulty-pair cleanup runs
    /// in a second transaction afterwards.
    pub fn sync<S: Store>(&self, store: &S) -> Result<SyncReport> {
        info!("Syncing role definition");
        let compiled = self.compile()?;

        let mut report = store.transaction(|tx| -> Result<SyncReport> {
            let mut report = SyncReport::default();
            Self::create_custom_permissions(tx)?;

            for (name, rule) in &compiled {
                let count = self.set_role(tx, name, rule)?;
                report.roles.insert((*name).to_string(), count);
            }

            if let (Some(public_role), Some(template)) =
                (&self.public_role, &self.public_role_like)
            {
                self.copy_role_in(tx, &compiled, template, public_role, true)?;
            }

            report.missing_perms_created = tx.create_missing_perms()?;
            Ok(report)
        })?;

        report.faulty_pvms_deleted =
            store.transaction(|tx| -> Result<usize> { Ok(tx.clean_faulty_pvms()?) })?;
        Ok(report)
    }

    /// Copies the pairs of `from` onto `to`, creating `to` if needed.
    ///
    /// A built-in `from` is evaluated from its rule rather than read from the
    /// stored role. With `merge`, data-access pairs already on `to` survive.
    pub fn copy_role<S: Store>(&self, store: &S, from: &str, to: &str, merge: bool) -> Result<()> {
        let compiled = self.compile()?;
        store.transaction(|tx| self.copy_role_in(tx, &compiled, from, to, merge))
    }

    /// Ensures the fixed custom permission pairs exist.
    pub fn create_custom_permissions(tx: &mut dyn CatalogMut) -> Result<()> {
        for (permission, resource) in CUSTOM_PERMISSIONS {
            tx.find_or_create_pvm(permission, resource)?;
        }
        Ok(())
    }

    fn matching_pvms(&self, tx: &dyn CatalogMut, rule: &CompiledRule) -> Result<BTreeSet<PvmId>> {
        Ok(tx
            .resolved_pvms()?
            .into_iter()
            .filter(|pvm| rule.matches(&self.policy, pvm))
            .map(|pvm| pvm.id)
            .collect())
    }

    fn set_role(&self, tx: &mut dyn CatalogMut, name: &str, rule: &CompiledRule) -> Result<usize> {
        info!(role = %name, "Syncing role perms");
        let pvm_ids = self.matching_pvms(tx, rule)?;
        let role = tx.add_role(name)?;
        let count = pvm_ids.len();
        tx.set_role_pvms(role.id, pvm_ids)?;
        Ok(count)
    }

    fn copy_role_in(
        &self,
        tx: &mut dyn CatalogMut,
        compiled: &[(&str, CompiledRule)],
        from: &str,
        to: &str,
        merge: bool,
    ) -> Result<()> {
        info!(from = %from, to = %to, "Copy/Merge role");

        let mut pvm_ids = match compiled.iter().find(|(name, _)| *name == from) {
            Some((_, rule)) => self.matching_pvms(tx, rule)?,
            None => {
                tx.find_role(from)?
                    .ok_or_else(|| SecurityError::RoleNotFound(from.to_string()))?
                    .pvm_ids
            }
        };

        let role_to = tx.add_role(to)?;
        if merge {
            for id in &role_to.pvm_ids {
                if pvm_ids.contains(id) {
                    continue;
                }
                let Some(pvm) = tx.pvm(*id)? else { continue };
                if let Some(resolved) = tx.resolve_pvm(&pvm)?
                    && is_data_access_permission(&resolved.permission)
                {
                    pvm_ids.insert(*id);
                }
            }
        }

        tx.set_role_pvms(role_to.id, pvm_ids)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::PvmPattern;
    use palisade_catalog::{Catalog, MemoryStore, StoreError};
    use proptest::prelude::*;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .transaction::<_, StoreError>(|tx| {
                tx.find_or_create_pvm("can_read", "Dashboard")?;
                tx.find_or_create_pvm("can_write", "Dashboard")?;
                tx.find_or_create_pvm("can_list", "RoleModelView")?;
                tx.find_or_create_pvm("all_database_access", "all_database_access")?;
                tx.find_or_create_pvm("can_sqllab", "Palisade")?;
                tx.find_or_create_pvm("can_approve", "Palisade")?;
                tx.find_or_create_pvm("database_access", "[db1].(id:1)")?;
                Ok(())
            })
            .unwrap();
        store
    }

    fn role_pairs(store: &MemoryStore, name: &str) -> BTreeSet<(String, String)> {
        store
            .read::<_, StoreError>(|c| {
                let role = c.find_role(name)?.unwrap();
                let mut pairs = BTreeSet::new();
                for id in role.pvm_ids {
                    let pvm = c.resolve_pvm(&c.pvm(id)?.unwrap())?.unwrap();
                    pairs.insert((pvm.permission, pvm.resource));
                }
                Ok(pairs)
            })
            .unwrap()
    }

    fn all_role_sets(store: &MemoryStore) -> BTreeMap<String, BTreeSet<PvmId>> {
        store
            .read::<_, StoreError>(|c| {
                Ok(c.roles()?.into_iter().map(|r| (r.name, r.pvm_ids)).collect())
            })
            .unwrap()
    }

    fn pair(p: &str, r: &str) -> (String, String) {
        (p.to_string(), r.to_string())
    }

    #[test]
    fn sync_builds_builtin_roles() {
        let store = seeded();
        RoleSynchronizer::new().sync(&store).unwrap();

        let admin = role_pairs(&store, "Admin");
        assert!(admin.contains(&pair("can_list", "RoleModelView")));
        assert!(!admin.contains(&pair("database_access", "[db1].(id:1)")));
        assert!(admin.contains(&pair("can_share_chart", "Palisade")));

        let alpha = role_pairs(&store, "Alpha");
        assert!(alpha.contains(&pair("all_database_access", "all_database_access")));
        assert!(!alpha.contains(&pair("can_list", "RoleModelView")));

        let gamma = role_pairs(&store, "Gamma");
        assert!(gamma.contains(&pair("can_read", "Dashboard")));
        assert!(!gamma.contains(&pair("all_database_access", "all_database_access")));

        assert_eq!(
            role_pairs(&store, "sql_lab"),
            BTreeSet::from([pair("can_sqllab", "Palisade")])
        );
        assert_eq!(
            role_pairs(&store, "granter"),
            BTreeSet::from([pair("can_approve", "Palisade")])
        );
    }

    #[test]
    fn sync_is_idempotent() {
        let store = seeded();
        let sync = RoleSynchronizer::new();

        let first = sync.sync(&store).unwrap();
        let roles_after_first = all_role_sets(&store);
        let pvm_count = store.read::<_, StoreError>(|c| Ok(c.pvms()?.len())).unwrap();

        let second = sync.sync(&store).unwrap();
        assert_eq!(all_role_sets(&store), roles_after_first);
        assert_eq!(first.roles, second.roles);
        assert_eq!(second.missing_perms_created, 0);
        assert_eq!(
            store.read::<_, StoreError>(|c| Ok(c.pvms()?.len())).unwrap(),
            pvm_count
        );
    }

    #[test]
    fn sync_discards_manual_edits_to_builtin_roles() {
        let store = seeded();
        let sync = RoleSynchronizer::new();
        sync.sync(&store).unwrap();

        store
            .transaction::<_, StoreError>(|tx| {
                let extra = tx.find_or_create_pvm("database_access", "[db1].(id:1)")?;
                let mut gamma = tx.find_role("Gamma")?.unwrap();
                gamma.pvm_ids.insert(extra.id);
                tx.set_role_pvms(gamma.id, gamma.pvm_ids)
            })
            .unwrap();

        sync.sync(&store).unwrap();
        assert!(!role_pairs(&store, "Gamma").contains(&pair("database_access", "[db1].(id:1)")));
    }

    #[test]
    fn malformed_pattern_aborts_before_writing() {
        let store = seeded();
        let sync = RoleSynchronizer::new()
            .with_definition(RoleDefinition::patterns("broken", vec![PvmPattern::new("[", ".*")]));

        let result = sync.sync(&store);
        assert!(matches!(result, Err(SecurityError::InvalidPattern { .. })));
        assert!(all_role_sets(&store).is_empty());
    }

    #[test]
    fn pattern_roles_are_synchronized() {
        let store = seeded();
        let sync = RoleSynchronizer::new().with_definition(RoleDefinition::patterns(
            "dashboard_reader",
            vec![PvmPattern::new("Dashboard", "can_read"), PvmPattern::new("Dash.*", "can_read")],
        ));
        sync.sync(&store).unwrap();

        assert_eq!(
            role_pairs(&store, "dashboard_reader"),
            BTreeSet::from([pair("can_read", "Dashboard")])
        );
    }

    #[test]
    fn copy_role_merge_preserves_data_access() {
        let store = seeded();
        let sync = RoleSynchronizer::new();
        sync.sync(&store).unwrap();

        store
            .transaction::<_, StoreError>(|tx| {
                let role = tx.add_role("Public")?;
                let data = tx.find_or_create_pvm("database_access", "[db1].(id:1)")?;
                let ui = tx.find_or_create_pvm("can_write", "Dashboard")?;
                tx.set_role_pvms(role.id, [data.id, ui.id].into())
            })
            .unwrap();

        sync.copy_role(&store, "Gamma", "Public", true).unwrap();
        let public = role_pairs(&store, "Public");
        assert!(public.contains(&pair("database_access", "[db1].(id:1)")));
        assert!(public.contains(&pair("can_read", "Dashboard")));

        sync.copy_role(&store, "Gamma", "Public", false).unwrap();
        assert!(!role_pairs(&store, "Public").contains(&pair("database_access", "[db1].(id:1)")));
    }

    #[test]
    fn merged_public_role_survives_resync() {
        let store = seeded();
        let sync = RoleSynchronizer::new()
            .with_public_role_like(Some("Public".to_string()), Some("Gamma".to_string()));
        sync.sync(&store).unwrap();

        store
            .transaction::<_, StoreError>(|tx| {
                let data = tx.find_or_create_pvm("database_access", "[db1].(id:1)")?;
                let mut public = tx.find_role("Public")?.unwrap();
                public.pvm_ids.insert(data.id);
                tx.set_role_pvms(public.id, public.pvm_ids)
            })
            .unwrap();

        sync.sync(&store).unwrap();
        let public = role_pairs(&store, "Public");
        assert!(public.contains(&pair("database_access", "[db1].(id:1)")));
        assert_eq!(
            public.len(),
            role_pairs(&store, "Gamma").len() + 1
        );
    }

    #[test]
    fn copy_from_custom_role_uses_stored_pairs() {
        let store = seeded();
        store
            .transaction::<_, StoreError>(|tx| {
                let role = tx.add_role("analyst")?;
                let pvm = tx.find_or_create_pvm("can_write", "Dashboard")?;
                tx.set_role_pvms(role.id, [pvm.id].into())
            })
            .unwrap();

        let sync = RoleSynchronizer::new();
        sync.copy_role(&store, "analyst", "analyst_copy", false).unwrap();
        assert_eq!(
            role_pairs(&store, "analyst_copy"),
            BTreeSet::from([pair("can_write", "Dashboard")])
        );

        let missing = sync.copy_role(&store, "nobody", "x", true);
        assert!(matches!(missing, Err(SecurityError::RoleNotFound(_))));
    }

    proptest! {
        #[test]
        fn sync_idempotent_over_random_universes(
            pairs in proptest::collection::vec(
                (
                    prop::sample::select(vec![
                        "can_read",
                        "can_write",
                        "database_access",
                        "can_approve",
                        "muldelete",
                        "can_userinfo",
                    ]),
                    prop::sample::select(vec![
                        "Dashboard",
                        "Chart",
                        "Database",
                        "Dataset",
                        "Security",
                        "[db].(id:1)",
                    ]),
                ),
                0..20,
            )
        ) {
            let store = MemoryStore::new();
            store.transaction::<_, StoreError>(|tx| {
                for (p, r) in &pairs {
                    tx.find_or_create_pvm(p, r)?;
                }
                Ok(())
            }).unwrap();

            let sync = RoleSynchronizer::new();
            sync.sync(&store).unwrap();
            let first = all_role_sets(&store);
            sync.sync(&store).unwrap();
            prop_assert_eq!(all_role_sets(&store), first);
        }
    }
}
