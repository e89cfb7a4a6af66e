//! Logical schema model.
//!
//! User-defined tables and columns, the link specs relating them, the
//! restricted JSON Patch vocabulary used to version schema snapshots, and
//! the structural diff that produces patches.

pub mod column;
pub mod model;
pub mod patch;
pub mod table;
pub mod versioned;

pub use column::{
    Column, ColumnClass, ColumnKind, LinkKind, LinkSpec, RollupFn, SelectOption, SystemField,
};
pub use model::{ColumnPatch, LinkRequest, Schema, TablePatch};
pub use patch::{PatchOp, PatchOutcome, Pointer, apply_patch, diff};
pub use table::Table;
pub use versioned::{SchemaEnv, SchemaRecord};
