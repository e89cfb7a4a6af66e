//! Recording mock executor.
//!
//! Test support: records every statement with its parameters, serves canned
//! rows from a queue, and logs transaction lifecycle markers so tests can
//! assert atomicity. Rows are plain JSON objects; the row adapter exposes
//! them through the [`SqlRow`] port.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gridstore_domain::error::{Error, Result};
use gridstore_domain::ports::{Database, DatabaseExecutor, SqlParam, SqlRow, Transaction};
use serde_json::{Map, Value};

/// One recorded statement.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Statement text as the engine produced it.
    pub sql: String,
    /// Bound parameters.
    pub params: Vec<SqlParam>,
}

#[derive(Default)]
struct MockState {
    calls: Mutex<Vec<RecordedCall>>,
    row_batches: Mutex<VecDeque<Vec<Value>>>,
    affected: Mutex<VecDeque<u64>>,
    fail_next_execute: Mutex<Option<String>>,
}

impl MockState {
    fn record(&self, sql: &str, params: &[SqlParam]) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                sql: sql.to_owned(),
                params: params.to_vec(),
            });
        }
    }

    fn next_batch(&self) -> Vec<Value> {
        self.row_batches
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_default()
    }
}

/// Canned-response database implementing the ports.
#[derive(Clone, Default)]
pub struct MockDatabase {
    state: Arc<MockState>,
}

impl MockDatabase {
    /// Fresh mock with no canned responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one batch of rows; each `query_one`/`query_all` consumes one
    /// batch, in order.
    pub fn push_rows(&self, rows: Vec<Value>) {
        if let Ok(mut q) = self.state.row_batches.lock() {
            q.push_back(rows);
        }
    }

    /// Queue an affected-rows count for the next `execute`.
    pub fn push_affected(&self, affected: u64) {
        if let Ok(mut q) = self.state.affected.lock() {
            q.push_back(affected);
        }
    }

    /// Make the next `execute` fail with an internal error.
    pub fn fail_next_execute(&self, message: &str) {
        if let Ok(mut slot) = self.state.fail_next_execute.lock() {
            *slot = Some(message.to_owned());
        }
    }

    /// Everything recorded so far, including BEGIN/COMMIT/ROLLBACK markers.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state
            .calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Recorded statements excluding transaction markers.
    #[must_use]
    pub fn statements(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call.sql.as_str(), "BEGIN" | "COMMIT" | "ROLLBACK"))
            .collect()
    }
}

async fn run_execute(state: &MockState, sql: &str, params: &[SqlParam]) -> Result<u64> {
    state.record(sql, params);
    if let Ok(mut slot) = state.fail_next_execute.lock() {
        if let Some(message) = slot.take() {
            return Err(Error::internal(message));
        }
    }
    Ok(state
        .affected
        .lock()
        .ok()
        .and_then(|mut q| q.pop_front())
        .unwrap_or(1))
}

fn rows_from_batch(batch: Vec<Value>) -> Vec<Arc<dyn SqlRow>> {
    batch
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(fields) => Some(Arc::new(MockRow { fields }) as Arc<dyn SqlRow>),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl DatabaseExecutor for MockDatabase {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        run_execute(&self.state, sql, params).await
    }

    async fn query_one(&self, sql: &str, params: &[SqlParam]) -> Result<Option<Arc<dyn SqlRow>>> {
        self.state.record(sql, params);
        Ok(rows_from_batch(self.state.next_batch()).into_iter().next())
    }

    async fn query_all(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Arc<dyn SqlRow>>> {
        self.state.record(sql, params);
        Ok(rows_from_batch(self.state.next_batch()))
    }
}

#[async_trait]
impl Database for MockDatabase {
    async fn begin(&self) -> Result<Arc<dyn Transaction>> {
        self.state.record("BEGIN", &[]);
        Ok(Arc::new(MockTransaction {
            state: Arc::clone(&self.state),
        }))
    }
}

/// Transaction over the shared mock state; commit and rollback only leave
/// markers in the call log.
pub struct MockTransaction {
    state: Arc<MockState>,
}

#[async_trait]
impl DatabaseExecutor for MockTransaction {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        run_execute(&self.state, sql, params).await
    }

    async fn query_one(&self, sql: &str, params: &[SqlParam]) -> Result<Option<Arc<dyn SqlRow>>> {
        self.state.record(sql, params);
        Ok(rows_from_batch(self.state.next_batch()).into_iter().next())
    }

    async fn query_all(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Arc<dyn SqlRow>>> {
        self.state.record(sql, params);
        Ok(rows_from_batch(self.state.next_batch()))
    }
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn commit(&self) -> Result<()> {
        self.state.record("COMMIT", &[]);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.state.record("ROLLBACK", &[]);
        Ok(())
    }
}

/// JSON-backed row.
pub struct MockRow {
    fields: Map<String, Value>,
}

impl SqlRow for MockRow {
    fn try_get_string(&self, name: &str) -> Result<Option<String>> {
        Ok(self.fields.get(name).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }))
    }

    fn try_get_i64(&self, name: &str) -> Result<Option<i64>> {
        Ok(self.fields.get(name).and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }))
    }

    fn try_get_f64(&self, name: &str) -> Result<Option<f64>> {
        Ok(self.fields.get(name).and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }))
    }

    fn try_get_bool(&self, name: &str) -> Result<Option<bool>> {
        Ok(self.fields.get(name).and_then(Value::as_bool))
    }

    fn try_get_json(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.fields.get(name).and_then(|v| match v {
            Value::Object(_) | Value::Array(_) => Some(v.clone()),
            _ => None,
        }))
    }

    fn try_get_timestamp(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.fields.get(name).and_then(|v| {
            v.as_str().and_then(|s| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            })
        }))
    }
}
