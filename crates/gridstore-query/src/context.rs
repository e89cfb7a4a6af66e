//! Compilation context.
//!
//! A [`QueryContext`] binds everything a compiler needs to resolve a column
//! reference: the schema snapshot, the table being queried, the SQL alias
//! it is bound under, the formula function registry, and the fault policy.
//! Virtual columns recurse through the context (formula-in-formula, rollup
//! over a formula), so the context also carries a depth guard.

use gridstore_domain::error::{Error, Result};
use gridstore_domain::schema::{Column, ColumnKind, Schema, Table};
use tracing::warn;

use crate::column_ref;
use crate::formula;
use crate::formula::registry::FunctionRegistry;
use crate::fragment::SqlExpr;
use crate::relation;

/// Virtual-column chains deeper than this are treated as a compile fault.
const MAX_DEPTH: u8 = 8;

/// Fault policy, declared once at façade construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompilePolicy {
    /// In strict mode compiler faults surface as `BadRequest`; in
    /// permissive mode read paths degrade the faulty expression to NULL.
    pub strict: bool,
}

/// Everything needed to compile expressions against one table.
#[derive(Clone)]
pub struct QueryContext<'a> {
    /// Schema snapshot, immutable for the duration of the request.
    pub schema: &'a Schema,
    /// Table being queried.
    pub table: &'a Table,
    /// SQL alias the table is bound under.
    pub alias: String,
    /// Formula function registry.
    pub registry: &'a FunctionRegistry,
    /// Fault policy.
    pub policy: CompilePolicy,
    /// Current virtual-column recursion depth.
    pub depth: u8,
}

impl<'a> QueryContext<'a> {
    /// Context for the outer query of `table`, bound under the `base` alias.
    pub fn new(schema: &'a Schema, table: &'a Table, registry: &'a FunctionRegistry) -> Self {
        Self {
            schema,
            table,
            alias: "base".to_owned(),
            registry,
            policy: CompilePolicy::default(),
            depth: 0,
        }
    }

    /// Same context with a fault policy.
    #[must_use]
    pub fn with_policy(mut self, policy: CompilePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Child context for a correlated subquery over `table`. Fails once the
    /// virtual-column chain exceeds [`MAX_DEPTH`], which is how reference
    /// cycles between virtual columns terminate.
    pub fn descend(&self, table: &'a Table, alias: String) -> Result<QueryContext<'a>> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::bad_request(format!(
                "virtual column nesting exceeds {MAX_DEPTH} levels"
            )));
        }
        Ok(QueryContext {
            schema: self.schema,
            table,
            alias,
            registry: self.registry,
            policy: self.policy,
            depth: self.depth + 1,
        })
    }

    /// Alias for the next nesting level's subquery.
    #[must_use]
    pub fn child_alias(&self) -> String {
        format!("r{}", self.depth + 1)
    }

    /// SQL expression for a column: virtual kinds compile through their
    /// compilers, stored kinds through the fragment layer.
    pub fn column_expr(&self, column: &Column) -> Result<SqlExpr> {
        if column.kind.is_virtual() {
            self.virtual_expr(column)
        } else {
            column_ref::column_expr(column, self.table, &self.alias)
        }
    }

    /// [`Self::column_expr`] with the type cast applied for stored kinds.
    pub fn column_expr_cast(&self, column: &Column) -> Result<SqlExpr> {
        if column.kind.is_virtual() {
            self.virtual_expr(column)
        } else {
            column_ref::column_expr_cast(column, self.table, &self.alias)
        }
    }

    /// Compile a column, degrading to NULL with a warning in permissive
    /// mode. Read paths use this so one faulty virtual column cannot abort
    /// a whole list request.
    pub fn column_expr_or_null(&self, column: &Column) -> Result<SqlExpr> {
        match self.column_expr(column) {
            Ok(expr) => Ok(expr),
            Err(err) if !self.policy.strict => {
                warn!(column = %column.id, error = %err, "column compilation degraded to NULL");
                Ok(SqlExpr::null())
            }
            Err(err) => Err(err),
        }
    }

    /// Compile a virtual column to its SQL fragment.
    pub fn virtual_expr(&self, column: &Column) -> Result<SqlExpr> {
        match &column.kind {
            ColumnKind::Formula { expression } => formula::compile(self, expression),
            ColumnKind::Rollup {
                link_column_id,
                target_column_id,
                function,
            } => relation::rollup(self, link_column_id, target_column_id, *function),
            ColumnKind::Lookup {
                link_column_id,
                target_column_id,
            } => relation::lookup(self, link_column_id, target_column_id),
            ColumnKind::LinksCount { link_column_id } => {
                let link = self.link_column(link_column_id)?;
                relation::links_count(self, &link.0.id, link.1)
            }
            ColumnKind::Link(spec) => relation::links_count(self, &column.id, spec),
            _ => Err(Error::internal(format!(
                "column {} is not virtual",
                column.id
            ))),
        }
    }

    /// Resolve a link column by id on the current table, returning the
    /// column together with its spec.
    pub fn link_column(&self, id: &str) -> Result<(&'a Column, &'a gridstore_domain::schema::LinkSpec)> {
        let column = self
            .table
            .column_by_id(id)
            .ok_or_else(|| Error::not_found(format!("link column {id}")))?;
        let spec = column
            .kind
            .link_spec()
            .ok_or_else(|| Error::bad_request(format!("column {id} is not a link column")))?;
        Ok((column, spec))
    }

    /// Resolve a column by id, title or storage name on the current table.
    pub fn column(&self, key: &str) -> Result<&'a Column> {
        self.table
            .column(key)
            .ok_or_else(|| Error::not_found(format!("column {key} on table {}", self.table.id)))
    }
}
