//! # Store Layer
//!
//! Operations against the database ports: record CRUD and bulk writes,
//! many-to-many link maintenance, batched relation loading, record copying,
//! and the versioned schema store. Everything compiles its SQL through the
//! query layer and executes through [`gridstore_domain::ports`], so the
//! concrete driver stays swappable; the shipped provider targets Postgres
//! via sqlx.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`context`] | Request-scoped bundle of schema snapshot, handle and policy |
//! | [`shred`] | Type coercion, system/user separation, row deshredding |
//! | [`records`] | CRUD, list/count, bulk operations, group-by |
//! | [`links`] | MM link list/exclude/link/unlink operations |
//! | [`loader`] | Batched relation loading with per-column cache |
//! | [`copy`] | Shallow and deep record duplication |
//! | [`schema_store`] | Versioned snapshots and DEV→PRO publish |
//! | [`ddl`] | Physical-table bootstrap statements |
//! | [`executor`] | Postgres provider and the recording mock |

pub mod context;
pub mod copy;
pub mod ddl;
pub mod executor;
pub mod links;
pub mod loader;
pub mod records;
pub mod schema_store;
pub mod shred;

pub use context::StoreContext;
pub use copy::{CopyOps, CopyOptions};
pub use links::LinkOps;
pub use loader::LazyLoader;
pub use records::{BulkOptions, GroupRow, RecordOps};
pub use schema_store::SchemaStore;
