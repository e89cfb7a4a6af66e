//! Request-scoped operation context.
//!
//! One context binds an immutable schema snapshot, a database handle and
//! the compile-time policy knobs for the duration of one request. Operation
//! handles clone the `Arc`; nothing here is process-global.

use std::sync::Arc;

use gridstore_domain::error::Result;
use gridstore_domain::filter::ListLimits;
use gridstore_domain::ports::{Database, DatabaseExecutor, Transaction};
use gridstore_domain::schema::{Schema, Table};
use gridstore_query::{CompilePolicy, FunctionRegistry, QueryContext};

/// Shared state for one request's operations.
pub struct StoreContext {
    /// Immutable schema snapshot.
    pub schema: Arc<Schema>,
    /// Database handle; the only externally shared resource.
    pub db: Arc<dyn Database>,
    /// Formula function registry.
    pub registry: Arc<FunctionRegistry>,
    /// Compiler fault policy.
    pub policy: CompilePolicy,
    /// Page-size clamping.
    pub limits: ListLimits,
    /// Whether read paths project virtual columns.
    pub include_virtual: bool,
}

impl StoreContext {
    /// Context with default policy, limits and virtual projection on.
    pub fn new(schema: Arc<Schema>, db: Arc<dyn Database>) -> Self {
        Self {
            schema,
            db,
            registry: Arc::new(FunctionRegistry::standard()),
            policy: CompilePolicy::default(),
            limits: ListLimits::default(),
            include_virtual: true,
        }
    }

    /// The executor for an operation: the supplied transaction, or the
    /// plain handle.
    #[must_use]
    pub fn exec<'a>(&'a self, tx: Option<&'a dyn Transaction>) -> &'a dyn DatabaseExecutor {
        match tx {
            Some(tx) => tx,
            None => self.db.as_ref(),
        }
    }

    /// Compilation context for one table.
    pub fn query_ctx<'a>(&'a self, table: &'a Table) -> QueryContext<'a> {
        QueryContext::new(&self.schema, table, &self.registry).with_policy(self.policy)
    }

    /// Resolve a live table.
    pub fn table(&self, table_id: &str) -> Result<&Table> {
        self.schema.table(table_id)
    }
}
