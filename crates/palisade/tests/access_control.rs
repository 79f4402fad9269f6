//! End-to-end access evaluation through the security manager.

use palisade::{
    AccessSettings, AccessTarget, Chart, ChartId, Dashboard, DashboardId, Database, DatabaseId,
    Datasource, DatasourceId, ErrorType, MemoryStore, PalisadeError, PermissionModel,
    Principal, RoleId, SecurityManager, Store, StoreError, Table, User, UserId,
};
use test_case::test_case;

fn db1() -> Database {
    Database::new(DatabaseId::new(1), "db1")
}

fn orders(id: u64, schema: &str) -> Datasource {
    Datasource::new(DatasourceId::new(id), DatabaseId::new(1), "orders").with_schema(schema)
}

/// A store holding `db1` with `public.orders` (10) and `private.orders` (11).
fn seeded() -> MemoryStore {
    let store = MemoryStore::new();
    store.save_database(db1()).unwrap();
    store.save_datasource(orders(10, "public")).unwrap();
    store.save_datasource(orders(11, "private")).unwrap();
    store
}

/// Creates a role holding `pairs` and a user 1 with that role.
fn grant(store: &MemoryStore, pairs: &[(&str, &str)]) -> RoleId {
    store
        .transaction::<_, StoreError>(|tx| {
            let role = tx.add_role("analyst")?;
            let mut pvms = std::collections::BTreeSet::new();
            for (permission, resource) in pairs {
                pvms.insert(tx.find_or_create_pvm(permission, resource)?.id);
            }
            tx.set_role_pvms(role.id, pvms)?;
            tx.put_user(User::new(UserId::new(1), "ana").with_role(role.id))?;
            Ok(role.id)
        })
        .unwrap()
}

fn datasource(store: &MemoryStore, id: u64) -> Datasource {
    store
        .read::<_, StoreError>(|c| c.datasource(DatasourceId::new(id)))
        .unwrap()
        .unwrap()
}

#[test]
fn schema_grant_covers_only_its_schema() {
    let store = seeded();
    grant(&store, &[("schema_access", "[db1].[public]")]);
    let manager = SecurityManager::new(store);
    let principal = manager.load_user(UserId::new(1)).unwrap();
    let db = db1();

    let public = Table::new("orders", Some("public"));
    manager
        .raise_for_access(
            &principal,
            AccessTarget::Table {
                database: &db,
                table: &public,
            },
        )
        .unwrap();

    let private = Table::new("orders", Some("private"));
    let err = manager
        .raise_for_access(
            &principal,
            AccessTarget::Table {
                database: &db,
                table: &private,
            },
        )
        .unwrap_err();
    assert!(err.is_access_denied());
    let object = err.error_object().unwrap();
    assert_eq!(object.error_type, ErrorType::TableSecurityAccessError);
    assert_eq!(object.extra["tables"], serde_json::json!(["private.orders"]));
}

#[test]
fn query_denies_every_unreachable_table() {
    let store = seeded();
    grant(&store, &[("schema_access", "[db1].[public]")]);
    let manager = SecurityManager::new(store).with_settings(AccessSettings {
        permission_instructions_link: Some("https://wiki.example.com/access".into()),
        ..AccessSettings::default()
    });
    let principal = manager.load_user(UserId::new(1)).unwrap();
    let db = db1();

    let sql = "SELECT * FROM orders o \
               JOIN private.orders p ON o.id = p.id \
               JOIN audit.logins e ON e.id = o.id";
    let err = manager
        .raise_for_access(
            &principal,
            AccessTarget::Query {
                database: &db,
                sql,
                schema: Some("public"),
            },
        )
        .unwrap_err();

    let object = err.error_object().unwrap();
    assert_eq!(
        object.extra["tables"],
        serde_json::json!(["audit.logins", "private.orders"])
    );
    assert_eq!(object.extra["link"], "https://wiki.example.com/access");
    let expected = "You need access to the following tables: `audit.logins`, `private.orders`";
    assert!(object.message.starts_with(expected));
}

#[test_case(&[("all_database_access", "all_database_access")] ; "all database access")]
#[test_case(&[("all_datasource_access", "all_datasource_access")] ; "all datasource access")]
#[test_case(&[("database_access", "[db1].(id:1)")] ; "database access")]
fn broad_grants_reach_every_table(pairs: &[(&str, &str)]) {
    let store = seeded();
    grant(&store, pairs);
    let manager = SecurityManager::new(store);
    let principal = manager.load_user(UserId::new(1)).unwrap();
    let db = db1();

    let sql = "SELECT * FROM private.orders UNION ALL SELECT * FROM analytics.sessions";
    manager
        .raise_for_access(
            &principal,
            AccessTarget::Query {
                database: &db,
                sql,
                schema: None,
            },
        )
        .unwrap();
}

#[test]
fn datasource_grant_reaches_table_and_datasource() {
    let store = seeded();
    grant(&store, &[("datasource_access", "[db1].[orders](id:11)")]);
    let manager = SecurityManager::new(store);
    let principal = manager.load_user(UserId::new(1)).unwrap();
    let db = db1();

    let private = Table::new("orders", Some("private"));
    manager
        .raise_for_access(
            &principal,
            AccessTarget::Table {
                database: &db,
                table: &private,
            },
        )
        .unwrap();
    let granted = datasource(manager.store(), 11);
    manager
        .raise_for_access(&principal, AccessTarget::Datasource(&granted))
        .unwrap();

    let other = datasource(manager.store(), 10);
    let err = manager
        .raise_for_access(&principal, AccessTarget::Datasource(&other))
        .unwrap_err();
    let object = err.error_object().unwrap();
    assert_eq!(object.error_type, ErrorType::DatasourceSecurityAccessError);
    assert_eq!(object.extra["datasource"], "public.orders");
}

#[test]
fn persisted_datasources_carry_derived_perms() {
    let store = seeded();
    for id in [10, 11] {
        let ds = datasource(&store, id);
        assert_eq!(ds.perm.as_deref(), Some(ds.derive_perm(&db1()).as_str()));
        assert_eq!(ds.schema_perm, ds.derive_schema_perm(&db1()));
    }

    store
        .save_database(Database::new(DatabaseId::new(1), "warehouse"))
        .unwrap();
    let renamed = Database::new(DatabaseId::new(1), "warehouse");
    let ds = datasource(&store, 10);
    assert_eq!(ds.perm.as_deref(), Some("[warehouse].[orders](id:10)"));
    assert_eq!(ds.schema_perm.as_deref(), Some("[warehouse].[public]"));
    assert_eq!(ds.perm, Some(ds.derive_perm(&renamed)));
}

#[test]
fn default_manager_repairs_stale_perms_on_save() {
    let manager = SecurityManager::new(MemoryStore::new());
    manager
        .store()
        .save_database(Database::new(DatabaseId::new(1), "examples"))
        .unwrap();

    let mut stale = orders(1, "public");
    stale.perm = Some("[stale].[orders](id:1)".to_string());
    manager.store().save_datasource(stale).unwrap();

    let stored = datasource(manager.store(), 1);
    assert_eq!(stored.perm.as_deref(), Some("[examples].[orders](id:1)"));
    assert_eq!(stored.schema_perm.as_deref(), Some("[examples].[public]"));

    grant(manager.store(), &[("datasource_access", "[examples].[orders](id:1)")]);
    let principal = manager.load_user(UserId::new(1)).unwrap();
    manager
        .raise_for_access(&principal, AccessTarget::Datasource(&stored))
        .unwrap();
}

#[test]
fn dashboard_relationship_reaches_datasource_only_with_dashboard_rbac() {
    let store = seeded();
    let role = grant(&store, &[]);
    store
        .transaction::<_, StoreError>(|tx| {
            tx.put_chart(Chart {
                id: ChartId::new(5),
                datasource_id: DatasourceId::new(11),
            })?;
            tx.put_dashboard(
                Dashboard::new(DashboardId::new(3))
                    .published(true)
                    .with_role(role)
                    .with_chart(ChartId::new(5)),
            )
        })
        .unwrap();
    let target = datasource(&store, 11);

    let plain = SecurityManager::new(store);
    let principal = plain.load_user(UserId::new(1)).unwrap();
    assert!(plain
        .raise_for_access(&principal, AccessTarget::Datasource(&target))
        .is_err());

    let rbac = plain.with_settings(AccessSettings {
        dashboard_rbac: true,
        ..AccessSettings::default()
    });
    rbac.raise_for_access(&principal, AccessTarget::Datasource(&target))
        .unwrap();
}

#[test]
fn dashboard_access_follows_relationships() {
    let store = seeded();
    let role = grant(&store, &[]);
    store
        .transaction::<_, StoreError>(|tx| {
            tx.put_dashboard(
                Dashboard::new(DashboardId::new(1))
                    .published(true)
                    .with_role(RoleId::new(999)),
            )?;
            tx.put_dashboard(Dashboard::new(DashboardId::new(2)).published(true).with_role(role))?;
            tx.put_dashboard(
                Dashboard::new(DashboardId::new(3))
                    .with_owner(UserId::new(1))
                    .with_role(RoleId::new(999)),
            )?;
            tx.put_dashboard(Dashboard::new(DashboardId::new(4)).with_role(RoleId::new(999)))
        })
        .unwrap();
    let manager = SecurityManager::new(store).with_settings(AccessSettings {
        dashboard_rbac: true,
        ..AccessSettings::default()
    });
    let principal = manager.load_user(UserId::new(1)).unwrap();

    assert!(manager.can_access_dashboard(&principal, DashboardId::new(1)).is_err());
    assert!(manager.can_access_dashboard(&principal, DashboardId::new(2)).is_ok());
    assert!(manager.can_access_dashboard(&principal, DashboardId::new(3)).is_ok());

    let err = manager
        .can_access_dashboard(&principal, DashboardId::new(4))
        .unwrap_err();
    assert_eq!(err.error_object().unwrap().error_type, ErrorType::DashboardAccessDenied);

    assert!(matches!(
        manager.can_access_dashboard(&principal, DashboardId::new(404)),
        Err(PalisadeError::Security(_))
    ));
}

#[test]
fn activity_access_respects_broad_override() {
    let store = seeded();
    grant(&store, &[]);
    let open = SecurityManager::new(store);
    let principal = open.load_user(UserId::new(1)).unwrap();
    open.raise_for_user_activity_access(&principal, UserId::new(2)).unwrap();

    let closed = open.with_settings(AccessSettings {
        broad_activity_access: false,
        ..AccessSettings::default()
    });
    closed
        .raise_for_user_activity_access(&principal, UserId::new(1))
        .unwrap();
    let err = closed
        .raise_for_user_activity_access(&principal, UserId::new(2))
        .unwrap_err();
    assert_eq!(
        err.error_object().unwrap().error_type,
        ErrorType::UserActivitySecurityAccessError
    );
    assert!(closed
        .raise_for_user_activity_access(&Principal::Anonymous, UserId::new(2))
        .is_err());
}

#[test]
fn unknown_user_is_not_found() {
    let manager = SecurityManager::new(seeded());
    assert!(matches!(
        manager.load_user(UserId::new(42)),
        Err(PalisadeError::Store(StoreError::NotFound { kind: "user", .. }))
    ));
}
