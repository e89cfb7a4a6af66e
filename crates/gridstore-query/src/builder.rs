//! SELECT builder.
//!
//! Every query over a logical table starts here, and every query carries
//! the `table_id` predicate from construction: the data-isolation
//! invariant is structural, not a convention call sites remember.

use gridstore_domain::constants::records;
use gridstore_domain::error::Result;
use gridstore_domain::ports::SqlParam;
use gridstore_domain::sanitize;
use gridstore_domain::schema::Table;

use crate::column_ref;
use crate::fragment::SqlExpr;

/// Builder for SELECT statements over one logical table.
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    physical_table: &'static str,
    alias: String,
    projections: Vec<SqlExpr>,
    conditions: Vec<SqlExpr>,
    orders: Vec<SqlExpr>,
    group_by: Option<SqlExpr>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SelectBuilder {
    /// Start a query over `table` bound under `alias`, constrained to the
    /// table's rows.
    pub fn new(table: &Table, alias: &str) -> Result<Self> {
        let alias = sanitize::ensure_alias(alias)?.to_owned();
        let isolation = SqlExpr::bind(
            format!("\"{alias}\".\"{}\" = ?", records::TABLE_ID),
            vec![SqlParam::string(&table.id)],
        );
        Ok(Self {
            physical_table: column_ref::physical_table(table),
            alias,
            projections: Vec::new(),
            conditions: vec![isolation],
            orders: Vec::new(),
            group_by: None,
            limit: None,
            offset: None,
        })
    }

    /// Add a projection expression.
    pub fn project(&mut self, expr: SqlExpr) -> &mut Self {
        self.projections.push(expr);
        self
    }

    /// Add a projection with an output alias.
    pub fn project_as(&mut self, expr: SqlExpr, alias: &str) -> Result<&mut Self> {
        let alias = sanitize::ensure_alias(alias)?;
        self.projections
            .push(SqlExpr::bind(format!("{} AS \"{alias}\"", expr.sql), expr.params));
        Ok(self)
    }

    /// AND another predicate onto the WHERE clause.
    pub fn and_where(&mut self, expr: SqlExpr) -> &mut Self {
        self.conditions.push(expr);
        self
    }

    /// Append an ORDER BY expression.
    pub fn order_by(&mut self, expr: SqlExpr) -> &mut Self {
        self.orders.push(expr);
        self
    }

    /// Group rows by an expression.
    pub fn group_by(&mut self, expr: SqlExpr) -> &mut Self {
        self.group_by = Some(expr);
        self
    }

    /// Bound the result window.
    pub fn window(&mut self, limit: Option<u64>, offset: Option<u64>) -> &mut Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Assemble the SELECT statement.
    #[must_use]
    pub fn build(&self) -> SqlExpr {
        let mut out = SqlExpr::raw("SELECT ");
        if self.projections.is_empty() {
            out.push_sql("*");
        } else {
            out.push(SqlExpr::join(self.projections.clone(), ", "));
        }
        out.push_sql(&format!(
            " FROM \"{}\" \"{}\"",
            self.physical_table, self.alias
        ));
        out.push_sql(" WHERE ");
        out.push(SqlExpr::join(self.conditions.clone(), " AND "));
        if let Some(group) = &self.group_by {
            out.push_sql(" GROUP BY ");
            out.push(group.clone());
        }
        if !self.orders.is_empty() {
            out.push_sql(" ORDER BY ");
            out.push(SqlExpr::join(self.orders.clone(), ", "));
        }
        if let Some(limit) = self.limit {
            out.push_sql(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            out.push_sql(&format!(" OFFSET {offset}"));
        }
        out
    }

    /// Assemble `SELECT COUNT(*)` with the same WHERE stack, ignoring
    /// projections, ordering and the window.
    #[must_use]
    pub fn build_count(&self) -> SqlExpr {
        let mut out = SqlExpr::raw(format!(
            "SELECT COUNT(*) AS \"count\" FROM \"{}\" \"{}\" WHERE ",
            self.physical_table, self.alias
        ));
        out.push(SqlExpr::join(self.conditions.clone(), " AND "));
        out
    }
}
