//! # palisade-catalog: Permission model and entity catalog
//!
//! Holds everything the access-control engine reads and writes:
//! - **Grant vocabulary**: permissions, resources and their pairs
//! - **Grant holders**: roles and users
//! - **Protected objects**: databases, datasources, charts, dashboards,
//!   embedded dashboards and row-level security filters
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Store (read / transaction)                  │
//! │  ├─ Catalog        reads                     │
//! │  ├─ CatalogMut     writes                    │
//! │  └─ HookRegistry   before-commit callbacks   │
//! └─────────────────┬────────────────────────────┘
//!                   │
//!                   ▼
//! ┌──────────────────────────────────────────────┐
//! │  PermissionModel (idempotent creators,       │
//! │  faulty-pair cleanup, missing-perm backfill) │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use palisade_catalog::{Catalog, Database, MemoryStore, Store, StoreError};
//! use palisade_types::DatabaseId;
//!
//! let store = MemoryStore::new();
//! store.save_database(Database::new(DatabaseId::new(1), "examples"))?;
//!
//! let perm = store.read::<_, StoreError>(|c| {
//!     Ok(c.database(DatabaseId::new(1))?.and_then(|d| d.perm))
//! })?;
//! assert_eq!(perm.as_deref(), Some("[examples].(id:1)"));
//! # Ok::<(), StoreError>(())
//! ```

pub mod entities;
pub mod error;
pub mod hooks;
pub mod memory;
pub mod model;
pub mod perms;
pub mod store;

// Re-export commonly used types
pub use entities::{
    Chart, Dashboard, Database, Datasource, EmbeddedDashboard, Permission, PermissionResource,
    Resource, ResolvedPvm, Role, RowLevelSecurityFilter, User,
};
pub use error::{Result, StoreError};
pub use hooks::{BeforeCommit, EntityRef, HookRegistry, PermissionSync};
pub use memory::{CatalogState, MemoryStore};
pub use model::PermissionModel;
pub use store::{Catalog, CatalogMut, Store};
