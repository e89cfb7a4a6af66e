//! Logical record shape and write metadata.
//!
//! A logical record is a flat JSON object whose keys are column storage
//! names plus the system fields. The physical shape (system fields in
//! fixed columns, user values inside the `data` blob) never materializes
//! as a typed struct; the store layer shreds into and deshreds out of
//! driver rows directly.

use serde_json::{Map, Value};

/// A logical record as callers see it.
pub type Record = Map<String, Value>;

/// Request metadata threaded through write operations: the acting user and
/// an optional explicit transaction are carried by the operations layer,
/// this is the part that ends up in system columns.
#[derive(Debug, Clone, Default)]
pub struct WriteContext {
    /// Actor recorded in `created_by` / `updated_by`.
    pub user_id: Option<String>,
}
