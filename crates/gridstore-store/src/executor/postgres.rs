//! Postgres implementation of the database ports.
//!
//! Uses the domain ports [`DatabaseExecutor`], [`Transaction`] and
//! [`SqlRow`]; operation code depends on those traits and never on sqlx
//! directly. Generated SQL arrives with `?` placeholders and is rewritten
//! to `$n` with a quote-aware scanner before binding.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gridstore_domain::error::{Error, Result};
use gridstore_domain::ports::{Database, DatabaseExecutor, SqlParam, SqlRow, Transaction};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, Postgres, Row};
use tokio::sync::Mutex;

use crate::ddl;

/// Rewrite `?` placeholders to `$1..$n`, skipping quoted regions. String
/// literals produced by the formula compiler may legitimately contain `?`.
#[must_use]
pub fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0usize;
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' if !in_double => {
                // A doubled quote inside a literal is an escaped quote,
                // not a close-open pair worth tracking separately.
                if in_single && chars.peek() == Some(&'\'') {
                    out.push(ch);
                    out.push('\'');
                    chars.next();
                    continue;
                }
                in_single = !in_single;
                out.push(ch);
            }
            '"' if !in_single => {
                in_double = !in_double;
                out.push(ch);
            }
            '?' if !in_single && !in_double => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
            }
            other => out.push(other),
        }
    }
    out
}

/// Row adapter copying column values out of a [`PgRow`] so it can be
/// returned as `Arc<dyn SqlRow>` without borrowing the connection.
#[derive(Debug, Default)]
struct PgMappedRow {
    strings: HashMap<String, Option<String>>,
    i64s: HashMap<String, Option<i64>>,
    f64s: HashMap<String, Option<f64>>,
    bools: HashMap<String, Option<bool>>,
    jsons: HashMap<String, Option<Value>>,
    timestamps: HashMap<String, Option<DateTime<Utc>>>,
}

impl PgMappedRow {
    fn from_pg_row(row: &PgRow) -> Self {
        let mut mapped = Self::default();
        for (i, column) in row.columns().iter().enumerate() {
            let name = column.name().to_owned();
            if let Ok(v) = row.try_get::<i64, _>(i) {
                mapped.i64s.insert(name, Some(v));
            } else if let Ok(v) = row.try_get::<f64, _>(i) {
                mapped.f64s.insert(name, Some(v));
            } else if let Ok(v) = row.try_get::<bool, _>(i) {
                mapped.bools.insert(name, Some(v));
            } else if let Ok(v) = row.try_get::<sqlx::types::BigDecimal, _>(i) {
                // NUMERIC/DECIMAL outputs (casts, SUM/AVG rollups) land as
                // their canonical string form; readers parse on demand.
                mapped.strings.insert(name, Some(v.to_string()));
            } else if let Ok(v) = row.try_get::<DateTime<Utc>, _>(i) {
                mapped.timestamps.insert(name, Some(v));
            } else if let Ok(v) = row.try_get::<Value, _>(i) {
                mapped.jsons.insert(name, Some(v));
            } else if let Ok(v) = row.try_get::<String, _>(i) {
                mapped.strings.insert(name, Some(v));
            } else if let Ok(v) = row.try_get::<Option<String>, _>(i) {
                mapped.strings.insert(name, v);
            } else if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
                mapped.i64s.insert(name, v);
            } else {
                mapped.strings.insert(name, None);
            }
        }
        mapped
    }
}

impl SqlRow for PgMappedRow {
    fn try_get_string(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .strings
            .get(name)
            .cloned()
            .flatten()
            .or_else(|| self.i64s.get(name).and_then(|n| n.map(|v| v.to_string())))
            .or_else(|| {
                self.jsons.get(name).and_then(|j| {
                    j.as_ref().and_then(|v| v.as_str().map(str::to_owned))
                })
            }))
    }

    fn try_get_i64(&self, name: &str) -> Result<Option<i64>> {
        Ok(self.i64s.get(name).copied().flatten().or_else(|| {
            self.strings
                .get(name)
                .and_then(|s| s.as_ref().and_then(|s| s.parse().ok()))
        }))
    }

    fn try_get_f64(&self, name: &str) -> Result<Option<f64>> {
        Ok(self
            .f64s
            .get(name)
            .copied()
            .flatten()
            .or_else(|| self.i64s.get(name).and_then(|n| n.map(|v| v as f64)))
            .or_else(|| {
                self.strings
                    .get(name)
                    .and_then(|s| s.as_ref().and_then(|s| s.parse().ok()))
            }))
    }

    fn try_get_bool(&self, name: &str) -> Result<Option<bool>> {
        Ok(self.bools.get(name).copied().flatten())
    }

    fn try_get_json(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.jsons.get(name).cloned().flatten().or_else(|| {
            self.strings
                .get(name)
                .and_then(|s| s.as_ref().and_then(|s| serde_json::from_str(s).ok()))
        }))
    }

    fn try_get_timestamp(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.timestamps.get(name).copied().flatten().or_else(|| {
            self.strings.get(name).and_then(|s| {
                s.as_ref().and_then(|s| {
                    DateTime::parse_from_rfc3339(s)
                        .ok()
                        .map(|dt| dt.with_timezone(&Utc))
                })
            })
        }))
    }
}

fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    params: &'q [SqlParam],
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    for param in params {
        query = match param {
            SqlParam::String(s) => query.bind(s.as_str()),
            SqlParam::I64(n) => query.bind(*n),
            SqlParam::F64(n) => query.bind(*n),
            SqlParam::Bool(b) => query.bind(*b),
            SqlParam::Json(v) => query.bind(v.clone()),
            SqlParam::StringArray(items) => query.bind(items.clone()),
            SqlParam::Timestamp(ts) => query.bind(*ts),
            SqlParam::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

/// Map driver failures onto the error taxonomy. Unique-key collisions are
/// conflicts; everything else is internal.
fn map_sqlx_error(context: &str, err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return Error::conflict(format!("{context}: {db_err}"));
        }
    }
    Error::internal_with_source(format!("SQL failed: {context}"), err)
}

/// Provider options.
#[derive(Debug, Clone, Default)]
pub struct PgOptions {
    /// Backend-side per-query timeout; cancelled queries surface as
    /// internal errors and committed work stays committed.
    pub statement_timeout: Option<Duration>,
    /// Whether to apply the physical-table DDL on connect.
    pub bootstrap: bool,
}

/// Postgres database handle implementing the [`Database`] port.
pub struct PgDatabase {
    pool: sqlx::PgPool,
}

impl PgDatabase {
    /// Handle over an existing pool.
    #[must_use]
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Connect, optionally set the statement timeout, and bootstrap the
    /// physical tables when asked.
    pub async fn connect(url: &str, options: PgOptions) -> Result<Self> {
        let mut pool_options = PgPoolOptions::new();
        if let Some(timeout) = options.statement_timeout {
            let millis = timeout.as_millis();
            pool_options = pool_options.after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query(&format!("SET statement_timeout = {millis}"))
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            });
        }
        let pool = pool_options
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let database = Self::new(pool);
        if options.bootstrap {
            for statement in ddl::statements() {
                database.execute(&statement, &[]).await?;
            }
        }
        Ok(database)
    }
}

#[async_trait]
impl DatabaseExecutor for PgDatabase {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        let rewritten = rewrite_placeholders(sql);
        let result = bind_params(sqlx::query(&rewritten), params)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(sql, e))?;
        Ok(result.rows_affected())
    }

    async fn query_one(&self, sql: &str, params: &[SqlParam]) -> Result<Option<Arc<dyn SqlRow>>> {
        let rewritten = rewrite_placeholders(sql);
        let row = bind_params(sqlx::query(&rewritten), params)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(sql, e))?;
        Ok(row.map(|row| Arc::new(PgMappedRow::from_pg_row(&row)) as Arc<dyn SqlRow>))
    }

    async fn query_all(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Arc<dyn SqlRow>>> {
        let rewritten = rewrite_placeholders(sql);
        let rows = bind_params(sqlx::query(&rewritten), params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(sql, e))?;
        Ok(rows
            .iter()
            .map(|row| Arc::new(PgMappedRow::from_pg_row(row)) as Arc<dyn SqlRow>)
            .collect())
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> Result<Arc<dyn Transaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Arc::new(PgTransaction {
            inner: Mutex::new(Some(tx)),
        }))
    }
}

/// An open Postgres transaction. The handle is `Mutex`-guarded, so
/// concurrent use from one task set serializes; dropped uncommitted, the
/// inner sqlx transaction rolls back.
pub struct PgTransaction {
    inner: Mutex<Option<sqlx::Transaction<'static, Postgres>>>,
}

#[async_trait]
impl DatabaseExecutor for PgTransaction {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        let rewritten = rewrite_placeholders(sql);
        let mut guard = self.inner.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| Error::internal("transaction already closed"))?;
        let result = bind_params(sqlx::query(&rewritten), params)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error(sql, e))?;
        Ok(result.rows_affected())
    }

    async fn query_one(&self, sql: &str, params: &[SqlParam]) -> Result<Option<Arc<dyn SqlRow>>> {
        let rewritten = rewrite_placeholders(sql);
        let mut guard = self.inner.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| Error::internal("transaction already closed"))?;
        let row = bind_params(sqlx::query(&rewritten), params)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error(sql, e))?;
        Ok(row.map(|row| Arc::new(PgMappedRow::from_pg_row(&row)) as Arc<dyn SqlRow>))
    }

    async fn query_all(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Arc<dyn SqlRow>>> {
        let rewritten = rewrite_placeholders(sql);
        let mut guard = self.inner.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| Error::internal("transaction already closed"))?;
        let rows = bind_params(sqlx::query(&rewritten), params)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error(sql, e))?;
        Ok(rows
            .iter()
            .map(|row| Arc::new(PgMappedRow::from_pg_row(row)) as Arc<dyn SqlRow>)
            .collect())
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let tx = guard
            .take()
            .ok_or_else(|| Error::internal("transaction already closed"))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let tx = guard
            .take()
            .ok_or_else(|| Error::internal("transaction already closed"))?;
        tx.rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}
