//! # Domain Layer
//!
//! Core types for the gridstore record engine: the logical schema model
//! (tables, columns, link specs), the restricted JSON Patch vocabulary used
//! for schema versioning, filter/sort argument types, the identifier
//! service, the sanitizer, and the database ports every other layer binds
//! through.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`schema`] | Logical tables, columns, link specs, patch + diff |
//! | [`filter`] | Filter trees, sort specs, list/group-by arguments |
//! | [`record`] | Logical record type and write metadata |
//! | [`ports`] | Database executor / transaction port traits |
//! | [`ids`] | Sortable identifier generation |
//! | [`sanitize`] | Value sanitization and SQL identifier validation |
//! | [`error`] | Error taxonomy |
//!
//! The domain layer has no driver dependencies; everything that touches a
//! database goes through [`ports::DatabaseExecutor`].

pub mod constants;
pub mod error;
pub mod filter;
pub mod ids;
pub mod ports;
pub mod record;
pub mod sanitize;
pub mod schema;

pub use error::{Error, ErrorKind, Result};
