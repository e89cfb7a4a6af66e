//! # gridstore
//!
//! A schema-driven record engine: users define logical tables with typed
//! columns (primitive, select, formula, rollup, lookup, link) at runtime,
//! and the engine translates logical CRUD, filtering, sorting, aggregation
//! and relationship traversal into SQL against three physical tables
//! (records, link edges, schema snapshots) on a Postgres backend.
//!
//! The [`Model`] façade is the composition root: it binds an immutable
//! schema snapshot, a database handle and a capability bundle, and hands
//! out per-table operation handles.
//!
//! ```no_run
//! use std::sync::Arc;
//! use gridstore::prelude::*;
//! use gridstore_store::executor::{PgDatabase, postgres::PgOptions};
//!
//! # async fn demo() -> gridstore::Result<()> {
//! let mut schema = Schema::default();
//! schema.create_table(TableInit {
//!     title: "Notes".to_owned(),
//!     columns: vec![
//!         ColumnInit::new("Title", ColumnKind::Text),
//!         ColumnInit::new("Rating", ColumnKind::Number),
//!     ],
//!     ..TableInit::default()
//! })?;
//!
//! let db = PgDatabase::connect(
//!     "postgres://localhost/grid",
//!     PgOptions { bootstrap: true, ..PgOptions::default() },
//! )
//! .await?;
//! let model = Model::new(Arc::new(schema), Arc::new(db), ModelOptions::default());
//!
//! let notes = model.records("notes")?;
//! let record = notes
//!     .insert(
//!         serde_json::json!({"title": "hello", "rating": "5"})
//!             .as_object()
//!             .cloned()
//!             .unwrap_or_default(),
//!         None,
//!         &WriteContext::default(),
//!     )
//!     .await?;
//! # let _ = record;
//! # Ok(())
//! # }
//! ```

pub mod model;
pub mod prelude;

pub use gridstore_domain::{Error, ErrorKind, Result};
pub use model::{Bundle, Model, ModelOptions};

// The layers, re-exported whole for callers that need more than the
// prelude.
pub use gridstore_domain as domain;
pub use gridstore_query as query;
pub use gridstore_store as store;
