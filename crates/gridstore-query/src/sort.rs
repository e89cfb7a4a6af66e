//! Sort compiler.
//!
//! Lowers an ordered sort list into ORDER BY expressions with stable NULL
//! placement: ascending puts NULLs last, descending puts them first, so
//! paging across the null boundary stays deterministic.

use gridstore_domain::error::{Error, Result};
use gridstore_domain::filter::{SortDirection, SortSpec};
use tracing::warn;

use crate::context::QueryContext;
use crate::fragment::SqlExpr;

/// Compile sort specs to ORDER BY expressions, in order. Unknown columns
/// are dropped in permissive mode.
pub fn compile(ctx: &QueryContext<'_>, sorts: &[SortSpec]) -> Result<Vec<SqlExpr>> {
    let mut out = Vec::with_capacity(sorts.len());
    for sort in sorts {
        let Some(column) = ctx.table.column(&sort.column) else {
            if ctx.policy.strict {
                return Err(Error::not_found(format!(
                    "sort column {} on table {}",
                    sort.column, ctx.table.id
                )));
            }
            warn!(column = %sort.column, "dropping sort on unknown column");
            continue;
        };
        let expr = match ctx.column_expr_cast(column) {
            Ok(expr) => expr,
            Err(err) if !ctx.policy.strict => {
                warn!(column = %column.id, error = %err, "dropping uncompilable sort");
                continue;
            }
            Err(err) => return Err(err),
        };
        let suffix = match sort.direction {
            SortDirection::Asc => " ASC NULLS LAST",
            SortDirection::Desc => " DESC NULLS FIRST",
        };
        out.push(SqlExpr::bind(format!("{}{suffix}", expr.sql), expr.params));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::registry::FunctionRegistry;
    use gridstore_domain::schema::{Column, ColumnKind, Schema, Table};

    fn schema() -> Schema {
        Schema {
            tables: vec![Table {
                id: "t1".to_owned(),
                title: "T1".to_owned(),
                prefix: None,
                columns: vec![Column {
                    id: "priority".to_owned(),
                    title: "priority".to_owned(),
                    name: "priority".to_owned(),
                    kind: ColumnKind::Number,
                    pk: false,
                    required: false,
                    default: None,
                }],
                is_junction: false,
                deleted: false,
            }],
        }
    }

    #[test]
    fn null_placement_follows_direction() {
        let schema = schema();
        let registry = FunctionRegistry::standard();
        let table = schema.table("t1").expect("table");
        let ctx = QueryContext::new(&schema, table, &registry);

        let asc = compile(
            &ctx,
            &[SortSpec {
                column: "priority".to_owned(),
                direction: SortDirection::Asc,
            }],
        )
        .expect("compile");
        assert!(asc[0].sql.ends_with(" ASC NULLS LAST"));

        let desc = compile(
            &ctx,
            &[SortSpec {
                column: "priority".to_owned(),
                direction: SortDirection::Desc,
            }],
        )
        .expect("compile");
        assert!(desc[0].sql.ends_with(" DESC NULLS FIRST"));
    }

    #[test]
    fn unknown_sorts_are_dropped_in_permissive_mode() {
        let schema = schema();
        let registry = FunctionRegistry::standard();
        let table = schema.table("t1").expect("table");
        let ctx = QueryContext::new(&schema, table, &registry);
        let out = compile(
            &ctx,
            &[SortSpec {
                column: "ghost".to_owned(),
                direction: SortDirection::Asc,
            }],
        )
        .expect("compile");
        assert!(out.is_empty());
    }
}
