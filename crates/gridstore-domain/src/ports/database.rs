//! Database executor port.
//!
//! Abstraction for SQL execution so the record, link, copy and schema
//! operations do not depend on a concrete driver. Implementations live in
//! the store crate and are injected through the model façade.
//!
//! Generated SQL uses `?` placeholders; a provider translates them to its
//! native bind syntax. Values are always bound; the compilers never
//! interpolate user values into SQL text.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;

/// Parameter for prepared statement binding (driver-agnostic).
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// String value
    String(String),
    /// 64-bit integer
    I64(i64),
    /// 64-bit float
    F64(f64),
    /// Boolean
    Bool(bool),
    /// JSON document, bound as the driver's JSON type
    Json(Value),
    /// Array of strings, bound as the driver's text-array type
    StringArray(Vec<String>),
    /// Timestamp with timezone
    Timestamp(DateTime<Utc>),
    /// Null
    Null,
}

impl SqlParam {
    /// Convenience constructor for string params.
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// String param from an optional value, [`SqlParam::Null`] when absent.
    pub fn opt_string(s: Option<impl Into<String>>) -> Self {
        s.map_or(Self::Null, |v| Self::String(v.into()))
    }
}

/// Abstraction for a single query result row.
///
/// Implementations wrap driver-specific rows and expose values by column
/// name so operation code can deshred rows without depending on the driver.
pub trait SqlRow: Send + Sync {
    /// Try to get a string by column name.
    fn try_get_string(&self, name: &str) -> Result<Option<String>>;

    /// Try to get an i64 by column name.
    fn try_get_i64(&self, name: &str) -> Result<Option<i64>>;

    /// Try to get an f64 by column name.
    fn try_get_f64(&self, name: &str) -> Result<Option<f64>>;

    /// Try to get a bool by column name.
    fn try_get_bool(&self, name: &str) -> Result<Option<bool>>;

    /// Try to get a JSON document by column name.
    fn try_get_json(&self, name: &str) -> Result<Option<Value>>;

    /// Try to get a timestamp by column name.
    fn try_get_timestamp(&self, name: &str) -> Result<Option<DateTime<Utc>>>;
}

/// Port for executing SQL.
///
/// Both plain connections and open transactions implement this trait, so an
/// operation can run against either without caring which it was handed.
#[async_trait]
pub trait DatabaseExecutor: Send + Sync {
    /// Run a statement, returning the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64>;

    /// Run a query expected to produce at most one row.
    async fn query_one(&self, sql: &str, params: &[SqlParam]) -> Result<Option<Arc<dyn SqlRow>>>;

    /// Run a query producing any number of rows.
    async fn query_all(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Arc<dyn SqlRow>>>;
}

/// An open transaction. Dropped without [`Transaction::commit`], a provider
/// must roll back.
#[async_trait]
pub trait Transaction: DatabaseExecutor {
    /// Commit the transaction.
    async fn commit(&self) -> Result<()>;

    /// Roll the transaction back.
    async fn rollback(&self) -> Result<()>;
}

/// A database handle that can open transactions.
#[async_trait]
pub trait Database: DatabaseExecutor {
    /// Begin a transaction.
    async fn begin(&self) -> Result<Arc<dyn Transaction>>;
}
