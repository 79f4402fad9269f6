//! # palisade-rbac: Role synthesis and access evaluation
//!
//! Provides the authorization core for Palisade:
//! - **Role synthesis**: built-in roles derived from the pair universe by
//!   ordered predicates or regex pattern pairs
//! - **Access evaluation**: hierarchical checks for databases, schemas,
//!   tables, datasources and dashboards
//! - **Row-level security**: the effective filter set for a principal and a
//!   stable cache key
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Principal (anonymous / user / guest)       │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  AccessEvaluator                            │
//! │  ├─ Universal grant                         │
//! │  ├─ Database grant                          │
//! │  ├─ Schema grant                            │
//! │  ├─ Direct datasource grant                 │
//! │  ├─ Dashboard relationship                  │
//! │  └─ Row-level security filters             │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  Ok(()) or SecurityError + ErrorObject      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use palisade_catalog::{Database, MemoryStore, PermissionModel, Store};
//! use palisade_rbac::{AccessEvaluator, AccessSettings, Principal, SecurityError, Table};
//! use palisade_types::{DatabaseId, UserId};
//!
//! let store = MemoryStore::new();
//! let role = store.transaction::<_, SecurityError>(|tx| {
//!     let role = tx.add_role("analyst")?;
//!     let pvm = tx.find_or_create_pvm("schema_access", "[examples].[public]")?;
//!     tx.set_role_pvms(role.id, [pvm.id].into())?;
//!     Ok(role.id)
//! })?;
//!
//! let db = Database::new(DatabaseId::new(1), "examples");
//! let principal = Principal::user(UserId::new(1), [role]);
//! let settings = AccessSettings::default();
//!
//! store.read::<_, SecurityError>(|catalog| {
//!     let evaluator = AccessEvaluator::new(catalog, &principal, &settings);
//!     assert!(evaluator.can_access_table(&db, &Table::new("orders", Some("public")))?);
//!     assert!(!evaluator.can_access_table(&db, &Table::new("orders", Some("private")))?);
//!     Ok(())
//! })?;
//! # Ok::<(), SecurityError>(())
//! ```

pub mod error;
pub mod evaluator;
pub mod principal;
pub mod rls;
pub mod roles;
pub mod synchronizer;
pub mod tables;

// Re-export commonly used types
pub use error::{ErrorLevel, ErrorObject, ErrorType, Result, SecurityError};
pub use evaluator::{AccessEvaluator, AccessSettings, AccessTarget, Probe};
pub use principal::{
    GuestResourceId, GuestTokenResource, GuestTokenResourceType, GuestTokenRlsRule,
    GuestTokenUser, GuestUser, Principal, UserPrincipal,
};
pub use roles::{ClassificationPolicy, Classifier, PvmPattern, RoleDefinition, RoleRule};
pub use synchronizer::{CUSTOM_PERMISSIONS, RoleSynchronizer, SyncReport};
pub use tables::{SqlParserExtractor, Table, TableExtractor};
