//! Role synchronization and maintenance through the security manager.

use std::collections::BTreeSet;
use std::fs;

use palisade::{
    ConfigLoader, Database, DatabaseId, MemoryStore, PalisadeError, PermissionModel,
    SecurityError, SecurityManager, Store, StoreError, SyncReport,
};
use proptest::prelude::*;
use tempfile::tempdir;

const UNIVERSE: &[(&str, &str)] = &[
    ("can_read", "Dashboard"),
    ("can_write", "Dashboard"),
    ("muldelete", "Chart"),
    ("can_sqllab", "Palisade"),
    ("can_approve", "Palisade"),
    ("can_list", "Database"),
];

fn seeded(extra: &[(&str, &str)]) -> MemoryStore {
    let store = MemoryStore::new();
    store
        .save_database(Database::new(DatabaseId::new(1), "db1"))
        .unwrap();
    store
        .transaction::<_, StoreError>(|tx| {
            for (permission, resource) in UNIVERSE.iter().chain(extra) {
                tx.find_or_create_pvm(permission, resource)?;
            }
            Ok(())
        })
        .unwrap();
    store
}

fn pairs_of(store: &MemoryStore, role: &str) -> BTreeSet<(String, String)> {
    store
        .read::<_, StoreError>(|c| {
            let role = c.find_role(role)?.expect("role exists");
            let mut pairs = BTreeSet::new();
            for id in role.pvm_ids {
                if let Some(pvm) = c.pvm(id)?
                    && let Some(resolved) = c.resolve_pvm(&pvm)?
                {
                    pairs.insert((resolved.permission, resolved.resource));
                }
            }
            Ok(pairs)
        })
        .unwrap()
}

fn has(pairs: &BTreeSet<(String, String)>, permission: &str, resource: &str) -> bool {
    pairs.contains(&(permission.to_string(), resource.to_string()))
}

#[test]
fn builtin_roles_are_classified_from_the_universe() {
    let manager = SecurityManager::new(seeded(&[]));
    let report = manager.sync_role_definitions().unwrap();
    assert_eq!(
        report.roles.keys().map(String::as_str).collect::<Vec<_>>(),
        ["Admin", "Alpha", "Gamma", "granter", "sql_lab"]
    );
    let store = manager.store();

    let admin = pairs_of(store, "Admin");
    assert!(has(&admin, "can_approve", "Palisade"));
    assert!(!has(&admin, "database_access", "[db1].(id:1)"));

    let alpha = pairs_of(store, "Alpha");
    assert!(has(&alpha, "muldelete", "Chart"));
    assert!(!has(&alpha, "can_approve", "Palisade"));

    let gamma = pairs_of(store, "Gamma");
    assert!(has(&gamma, "can_read", "Dashboard"));
    assert!(has(&gamma, "can_list", "Database"));
    assert!(!has(&gamma, "muldelete", "Chart"));

    assert_eq!(
        pairs_of(store, "granter"),
        BTreeSet::from([("can_approve".to_string(), "Palisade".to_string())])
    );
    assert!(has(&pairs_of(store, "sql_lab"), "can_sqllab", "Palisade"));

    // Custom permissions were created alongside.
    assert!(has(&admin, "all_query_access", "all_query_access"));
    assert!(has(&alpha, "all_datasource_access", "all_datasource_access"));
}

#[test]
fn sync_is_idempotent() {
    let manager = SecurityManager::new(seeded(&[]));
    let first = manager.sync_role_definitions().unwrap();
    let roles_before: Vec<_> = ["Admin", "Alpha", "Gamma", "granter", "sql_lab"]
        .iter()
        .map(|r| pairs_of(manager.store(), r))
        .collect();

    let second = manager.sync_role_definitions().unwrap();
    let roles_after: Vec<_> = ["Admin", "Alpha", "Gamma", "granter", "sql_lab"]
        .iter()
        .map(|r| pairs_of(manager.store(), r))
        .collect();

    assert_eq!(roles_before, roles_after);
    assert_eq!(first.roles, second.roles);
    assert_eq!(
        second,
        SyncReport {
            roles: first.roles.clone(),
            missing_perms_created: 0,
            faulty_pvms_deleted: 0,
        }
    );
}

#[test]
fn merged_public_role_keeps_hand_granted_data_access() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    fs::write(
        temp_dir.path().join("palisade.toml"),
        "[auth]\nrole_public = \"Public\"\npublic_role_like = \"Gamma\"\n",
    )
    .expect("Failed to write config");
    let config = ConfigLoader::new()
        .with_project_dir(temp_dir.path())
        .with_env_source(Default::default())
        .load()
        .expect("Failed to load config");

    let manager = SecurityManager::from_config(seeded(&[]), &config).unwrap();
    manager.sync_role_definitions().unwrap();

    manager
        .store()
        .transaction::<_, StoreError>(|tx| {
            let public = tx.find_role("Public")?.expect("public role created by sync");
            let granted = tx.find_or_create_pvm("database_access", "[db1].(id:1)")?;
            let mut pvms = public.pvm_ids;
            pvms.insert(granted.id);
            tx.set_role_pvms(public.id, pvms)
        })
        .unwrap();

    manager.sync_role_definitions().unwrap();

    let public = pairs_of(manager.store(), "Public");
    assert!(has(&public, "database_access", "[db1].(id:1)"));
    assert!(has(&public, "can_read", "Dashboard"));
    assert!(!has(&pairs_of(manager.store(), "Gamma"), "database_access", "[db1].(id:1)"));
}

#[test]
fn copy_without_merge_replaces_destination() {
    let manager = SecurityManager::new(seeded(&[]));
    manager.sync_role_definitions().unwrap();
    manager
        .store()
        .transaction::<_, StoreError>(|tx| {
            let role = tx.add_role("Analyst")?;
            let granted = tx.find_or_create_pvm("database_access", "[db1].(id:1)")?;
            tx.set_role_pvms(role.id, [granted.id].into())
        })
        .unwrap();

    manager.copy_role("granter", "Analyst", false).unwrap();
    assert_eq!(
        pairs_of(manager.store(), "Analyst"),
        pairs_of(manager.store(), "granter")
    );

    assert!(matches!(
        manager.copy_role("NoSuchRole", "Analyst", true),
        Err(PalisadeError::Security(SecurityError::RoleNotFound(_)))
    ));
}

#[test]
fn faulty_pairs_are_cleaned_once() {
    let manager = SecurityManager::new(seeded(&[("can_edit", "Orphaned")]));
    manager
        .store()
        .transaction::<_, StoreError>(|tx| {
            let resource = tx.find_resource("Orphaned")?.expect("seeded");
            tx.delete_resource(resource.id)?;
            Ok(())
        })
        .unwrap();

    assert_eq!(manager.clean_faulty_pvms().unwrap(), 1);
    assert_eq!(manager.clean_faulty_pvms().unwrap(), 0);
}

#[test]
fn missing_perms_are_backfilled_once() {
    let store = MemoryStore::new();
    store
        .transaction::<_, StoreError>(|tx| {
            tx.put_database(Database::new(DatabaseId::new(1), "db1"))
        })
        .unwrap();
    let manager = SecurityManager::new(store);

    assert_eq!(manager.create_missing_perms().unwrap(), 1);
    assert_eq!(manager.create_missing_perms().unwrap(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn resync_never_changes_roles(
        extra in proptest::collection::vec(("[a-z_]{3,12}", "[A-Za-z ]{3,16}"), 0..12)
    ) {
        let extra: Vec<(&str, &str)> =
            extra.iter().map(|(p, r)| (p.as_str(), r.as_str())).collect();
        let manager = SecurityManager::new(seeded(&extra));
        let first = manager.sync_role_definitions().unwrap();
        let snapshot: Vec<_> = first.roles.keys().map(|r| pairs_of(manager.store(), r)).collect();

        manager.sync_role_definitions().unwrap();
        let again: Vec<_> = first.roles.keys().map(|r| pairs_of(manager.store(), r)).collect();
        prop_assert_eq!(snapshot, again);
    }
}
