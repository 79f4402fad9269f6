//! # Palisade
//!
//! Access control for analytics platforms: which principal may see which
//! database, schema, table, dataset and dashboard, which rows of a table they
//! see, and how unauthenticated viewers of embedded dashboards get scoped,
//! time-bounded access.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        SecurityManager                        │
//! │  ┌─────────────┐   ┌────────────────┐   ┌──────────────────┐  │
//! │  │ Guest token │ → │ AccessEvaluator│ → │   RLS resolver   │  │
//! │  │  (request)  │   │  (principal)   │   │ (filters, keys)  │  │
//! │  └─────────────┘   └───────┬────────┘   └──────────────────┘  │
//! │                            ▼                                  │
//! │  ┌──────────────────────────────────────────────────────────┐ │
//! │  │      Catalog: permissions × resources → roles (Store)    │ │
//! │  └──────────────────────────────────────────────────────────┘ │
//! │                            ▲                                  │
//! │                   RoleSynchronizer (admin only)               │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use palisade::{
//!     AccessTarget, Database, MemoryStore, PermissionModel, Principal,
//!     SecurityManager, Store, Table, User,
//! };
//! use palisade::{DatabaseId, UserId};
//!
//! let store = MemoryStore::new();
//! store.save_database(Database::new(DatabaseId::new(1), "db1"))?;
//! store.transaction::<_, palisade::StoreError>(|tx| {
//!     let role = tx.add_role("analyst")?;
//!     let pvm = tx.find_or_create_pvm("schema_access", "[db1].[public]")?;
//!     tx.set_role_pvms(role.id, [pvm.id].into())?;
//!     tx.put_user(User::new(UserId::new(1), "ana").with_role(role.id))
//! })?;
//!
//! let manager = SecurityManager::new(store);
//! let principal = manager.load_user(UserId::new(1))?;
//! let db = Database::new(DatabaseId::new(1), "db1");
//!
//! let public = Table::new("orders", Some("public"));
//! let target = AccessTarget::Table { database: &db, table: &public };
//! assert!(manager.raise_for_access(&principal, target).is_ok());
//!
//! let private = Table::new("orders", Some("private"));
//! let target = AccessTarget::Table { database: &db, table: &private };
//! assert!(manager.raise_for_access(&principal, target).is_err());
//! # Ok::<(), palisade::PalisadeError>(())
//! ```
//!
//! # Modules
//!
//! - **SDK Layer**: [`SecurityManager`] - Main API
//! - **Catalog**: entities, [`Store`], [`MemoryStore`], permission-string repair
//! - **Access control**: [`AccessEvaluator`], [`RoleSynchronizer`], row-level security
//! - **Guest credentials**: [`GuestTokenService`]

mod error;
mod manager;
mod settings;

// SDK Layer - Main API
pub use error::{PalisadeError, Result};
pub use manager::SecurityManager;
pub use settings::{access_settings, guest_token_config, role_synchronizer};

// Re-export core types
pub use palisade_types::{
    ChartId, DashboardId, DatabaseId, DatasourceId, PermissionId, PvmId, ResourceId, RlsFilterId,
    RlsFilterType, RoleId, Timestamp, UserId,
};

// Re-export catalog types
pub use palisade_catalog::{
    BeforeCommit, Catalog, CatalogMut, Chart, Dashboard, Database, Datasource, EmbeddedDashboard,
    EntityRef, MemoryStore, PermissionModel, PermissionSync, Role, RowLevelSecurityFilter, Store,
    StoreError, User,
};

// Re-export access control
pub use palisade_rbac::{
    AccessEvaluator, AccessSettings, AccessTarget, ClassificationPolicy, ErrorLevel, ErrorObject,
    ErrorType, GuestResourceId, GuestTokenResource, GuestTokenRlsRule, GuestTokenUser, GuestUser,
    Principal, Probe, RoleDefinition, RoleSynchronizer, SecurityError, SqlParserExtractor,
    SyncReport, Table, TableExtractor,
};

// Re-export guest credentials
pub use palisade_guest::{
    Audience, Clock, FixedClock, GuestRequest, GuestTokenConfig, GuestTokenError,
    GuestTokenService, RequestParts, SystemClock,
};

// Re-export configuration
pub use palisade_config::{ConfigLoader, PalisadeConfig};
