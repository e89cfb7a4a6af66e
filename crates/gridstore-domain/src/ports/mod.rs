//! Port interfaces implemented by providers.

pub mod database;

pub use database::{Database, DatabaseExecutor, SqlParam, SqlRow, Transaction};
