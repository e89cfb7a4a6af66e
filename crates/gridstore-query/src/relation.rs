//! Relation compilers: rollup, lookup and link-count.
//!
//! Each produces a correlated scalar subquery against the parent row's id,
//! shaped by the relation kind of the underlying link column. Fragments are
//! embeddable in SELECT, WHERE and ORDER BY alike.

use gridstore_domain::constants::{LINKS_TABLE, RECORDS_TABLE, links, records};
use gridstore_domain::error::{Error, Result};
use gridstore_domain::ports::SqlParam;
use gridstore_domain::sanitize;
use gridstore_domain::schema::{Column, LinkKind, LinkSpec, RollupFn, Table};

use crate::column_ref::cast_type;
use crate::context::QueryContext;
use crate::fragment::SqlExpr;

/// The relation predicate parts shared by all three compilers: the child
/// FROM clause and the correlation WHERE clause, with their parameters.
struct RelationScope<'a> {
    child_table: &'a Table,
    child_alias: String,
    /// WHERE predicate correlating child rows to the parent row.
    predicate: SqlExpr,
}

fn scope<'a>(
    ctx: &QueryContext<'a>,
    link_field_id: &str,
    spec: &LinkSpec,
) -> Result<RelationScope<'a>> {
    let child_table = ctx.schema.table(&spec.related_table_id)?;
    let child_alias = ctx.child_alias();
    let parent = sanitize::ensure_alias(&ctx.alias)?;
    let child = sanitize::ensure_alias(&child_alias)?;

    let predicate = match spec.kind {
        LinkKind::ManyToMany => SqlExpr::bind(
            format!(
                "\"{child}\".\"{table_id}\" = ? AND \"{child}\".\"{id}\" IN \
                 (SELECT \"lk\".\"{target}\" FROM \"{links_table}\" \"lk\" \
                 WHERE \"lk\".\"{field}\" = ? AND \"lk\".\"{source}\" = \"{parent}\".\"{id}\")",
                table_id = records::TABLE_ID,
                id = records::ID,
                target = links::TARGET_RECORD_ID,
                links_table = LINKS_TABLE,
                field = links::LINK_FIELD_ID,
                source = links::SOURCE_RECORD_ID,
            ),
            vec![
                SqlParam::string(&spec.related_table_id),
                SqlParam::string(link_field_id),
            ],
        ),
        LinkKind::HasMany => {
            let fk = fk_name(spec)?;
            SqlExpr::bind(
                format!(
                    "\"{child}\".\"{table_id}\" = ? AND \
                     \"{child}\".\"{data}\" ->> '{fk}' = \"{parent}\".\"{id}\"",
                    table_id = records::TABLE_ID,
                    data = records::DATA,
                    id = records::ID,
                ),
                vec![SqlParam::string(&spec.related_table_id)],
            )
        }
        LinkKind::BelongsTo => {
            let fk = fk_name(spec)?;
            SqlExpr::bind(
                format!(
                    "\"{child}\".\"{table_id}\" = ? AND \
                     \"{child}\".\"{id}\" = \"{parent}\".\"{data}\" ->> '{fk}'",
                    table_id = records::TABLE_ID,
                    id = records::ID,
                    data = records::DATA,
                ),
                vec![SqlParam::string(&spec.related_table_id)],
            )
        }
    };

    Ok(RelationScope {
        child_table,
        child_alias,
        predicate,
    })
}

fn fk_name(spec: &LinkSpec) -> Result<&str> {
    let fk = spec
        .fk_column_name
        .as_deref()
        .ok_or_else(|| Error::bad_request("link column is missing its FK storage name"))?;
    sanitize::ensure_storage_name(fk)
}

/// Coerce an expression to NUMERIC for sum/avg over loosely typed targets.
fn numeric_expr(column: &Column, expr: &SqlExpr) -> SqlExpr {
    match cast_type(&column.kind) {
        Some("NUMERIC" | "DECIMAL") => expr.clone(),
        _ => SqlExpr::bind(
            format!("CAST(NULLIF(({})::text, '') AS NUMERIC)", expr.sql),
            expr.params.clone(),
        ),
    }
}

/// Aggregate expression for one rollup function over the target column.
fn aggregate(function: RollupFn, column: &Column, text: &SqlExpr, cast: &SqlExpr) -> SqlExpr {
    match function {
        RollupFn::Count => SqlExpr::raw("COUNT(*)"),
        RollupFn::Sum => {
            let coerced = numeric_expr(column, cast);
            SqlExpr::bind(format!("SUM({})", coerced.sql), coerced.params)
        }
        RollupFn::Avg => {
            let coerced = numeric_expr(column, cast);
            SqlExpr::bind(format!("AVG({})", coerced.sql), coerced.params)
        }
        RollupFn::Min => SqlExpr::bind(format!("MIN({})", cast.sql), cast.params.clone()),
        RollupFn::Max => SqlExpr::bind(format!("MAX({})", cast.sql), cast.params.clone()),
        RollupFn::CountEmpty => {
            let mut params = text.params.clone();
            params.extend(text.params.clone());
            SqlExpr::bind(
                format!(
                    "COUNT(*) FILTER (WHERE {e} IS NULL OR ({e})::text = '')",
                    e = text.sql
                ),
                params,
            )
        }
        RollupFn::CountNotEmpty => {
            let mut params = text.params.clone();
            params.extend(text.params.clone());
            SqlExpr::bind(
                format!(
                    "COUNT(*) FILTER (WHERE {e} IS NOT NULL AND ({e})::text <> '')",
                    e = text.sql
                ),
                params,
            )
        }
        RollupFn::CountDistinct => {
            SqlExpr::bind(format!("COUNT(DISTINCT {})", text.sql), text.params.clone())
        }
        RollupFn::SumDistinct => {
            let coerced = numeric_expr(column, cast);
            SqlExpr::bind(format!("SUM(DISTINCT {})", coerced.sql), coerced.params)
        }
        RollupFn::AvgDistinct => {
            let coerced = numeric_expr(column, cast);
            SqlExpr::bind(format!("AVG(DISTINCT {})", coerced.sql), coerced.params)
        }
    }
}

/// Compile a rollup column: aggregate the target column over the relation.
pub fn rollup(
    ctx: &QueryContext<'_>,
    link_column_id: &str,
    target_column_id: &str,
    function: RollupFn,
) -> Result<SqlExpr> {
    let (link, spec) = ctx.link_column(link_column_id)?;
    let scope = scope(ctx, &link.id, spec)?;
    let child_ctx = ctx.descend(scope.child_table, scope.child_alias.clone())?;
    let target = scope
        .child_table
        .column(target_column_id)
        .ok_or_else(|| Error::not_found(format!("rollup target column {target_column_id}")))?;

    let text = child_ctx.column_expr(target)?;
    let cast = child_ctx.column_expr_cast(target)?;
    let agg = aggregate(function, target, &text, &cast);

    let mut params = agg.params;
    params.extend(scope.predicate.params);
    Ok(SqlExpr::bind(
        format!(
            "(SELECT {agg} FROM \"{table}\" \"{alias}\" WHERE {predicate})",
            agg = agg.sql,
            table = RECORDS_TABLE,
            alias = scope.child_alias,
            predicate = scope.predicate.sql,
        ),
        params,
    ))
}

/// Compile a lookup column: project the target column off the first related
/// record.
pub fn lookup(
    ctx: &QueryContext<'_>,
    link_column_id: &str,
    target_column_id: &str,
) -> Result<SqlExpr> {
    let (link, spec) = ctx.link_column(link_column_id)?;
    let scope = scope(ctx, &link.id, spec)?;
    let child_ctx = ctx.descend(scope.child_table, scope.child_alias.clone())?;
    let target = scope
        .child_table
        .column(target_column_id)
        .ok_or_else(|| Error::not_found(format!("lookup target column {target_column_id}")))?;

    let projected = child_ctx.column_expr(target)?;
    let mut params = projected.params;
    params.extend(scope.predicate.params);
    Ok(SqlExpr::bind(
        format!(
            "(SELECT {projected} FROM \"{table}\" \"{alias}\" WHERE {predicate} LIMIT 1)",
            projected = projected.sql,
            table = RECORDS_TABLE,
            alias = scope.child_alias,
            predicate = scope.predicate.sql,
        ),
        params,
    ))
}

/// Compile the cardinality of a relation.
pub fn links_count(ctx: &QueryContext<'_>, link_field_id: &str, spec: &LinkSpec) -> Result<SqlExpr> {
    let parent = sanitize::ensure_alias(&ctx.alias)?;
    match spec.kind {
        LinkKind::ManyToMany => Ok(SqlExpr::bind(
            format!(
                "(SELECT COUNT(*) FROM \"{links_table}\" \"lk\" \
                 WHERE \"lk\".\"{field}\" = ? AND \"lk\".\"{source}\" = \"{parent}\".\"{id}\")",
                links_table = LINKS_TABLE,
                field = links::LINK_FIELD_ID,
                source = links::SOURCE_RECORD_ID,
                id = records::ID,
            ),
            vec![SqlParam::string(link_field_id)],
        )),
        LinkKind::HasMany => {
            let scope = scope(ctx, link_field_id, spec)?;
            let mut expr = SqlExpr::bind(
                format!(
                    "(SELECT COUNT(*) FROM \"{table}\" \"{alias}\" WHERE ",
                    table = RECORDS_TABLE,
                    alias = scope.child_alias,
                ),
                Vec::new(),
            );
            expr.push(scope.predicate);
            expr.push_sql(")");
            Ok(expr)
        }
        LinkKind::BelongsTo => {
            let fk = fk_name(spec)?;
            Ok(SqlExpr::raw(format!(
                "CASE WHEN \"{parent}\".\"{data}\" ->> '{fk}' IS NOT NULL THEN 1 ELSE 0 END",
                data = records::DATA,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::registry::FunctionRegistry;
    use gridstore_domain::schema::{ColumnKind, Schema};

    fn column(id: &str, kind: ColumnKind) -> Column {
        Column {
            id: id.to_owned(),
            title: id.to_owned(),
            name: id.to_owned(),
            kind,
            pk: false,
            required: false,
            default: None,
        }
    }

    fn table(id: &str, columns: Vec<Column>) -> Table {
        Table {
            id: id.to_owned(),
            title: id.to_owned(),
            prefix: None,
            columns,
            is_junction: false,
            deleted: false,
        }
    }

    fn mm_schema() -> Schema {
        Schema {
            tables: vec![
                table(
                    "tasks",
                    vec![
                        column("priority", ColumnKind::Number),
                        column(
                            "subtasks",
                            ColumnKind::Link(LinkSpec {
                                kind: LinkKind::ManyToMany,
                                related_table_id: "subtasks".to_owned(),
                                symmetric_column_id: None,
                                fk_column_name: None,
                            }),
                        ),
                    ],
                ),
                table("subtasks", vec![column("estimate", ColumnKind::Number)]),
            ],
        }
    }

    fn ctx<'a>(schema: &'a Schema, registry: &'a FunctionRegistry) -> QueryContext<'a> {
        QueryContext::new(schema, schema.table("tasks").expect("table"), registry)
    }

    #[test]
    fn mm_rollup_nests_the_edge_subquery() {
        let schema = mm_schema();
        let registry = FunctionRegistry::standard();
        let expr = rollup(&ctx(&schema, &registry), "subtasks", "estimate", RollupFn::Sum)
            .expect("compile");
        assert_eq!(
            expr.sql,
            "(SELECT SUM(CAST(NULLIF(\"r1\".\"data\" ->> 'estimate', '') AS NUMERIC)) \
             FROM \"gs_records\" \"r1\" WHERE \"r1\".\"table_id\" = ? AND \"r1\".\"id\" IN \
             (SELECT \"lk\".\"target_record_id\" FROM \"gs_links\" \"lk\" \
             WHERE \"lk\".\"link_field_id\" = ? AND \"lk\".\"source_record_id\" = \"base\".\"id\"))"
        );
        assert_eq!(
            expr.params,
            vec![SqlParam::string("subtasks"), SqlParam::string("subtasks")]
        );
    }

    #[test]
    fn count_empty_uses_a_filtered_aggregate() {
        let schema = mm_schema();
        let registry = FunctionRegistry::standard();
        let expr = rollup(
            &ctx(&schema, &registry),
            "subtasks",
            "estimate",
            RollupFn::CountEmpty,
        )
        .expect("compile");
        assert!(expr.sql.contains("COUNT(*) FILTER (WHERE"));
        assert!(expr.sql.contains("IS NULL OR"));
    }

    #[test]
    fn lookup_is_bounded_to_one_row() {
        let schema = mm_schema();
        let registry = FunctionRegistry::standard();
        let expr =
            lookup(&ctx(&schema, &registry), "subtasks", "estimate").expect("compile");
        assert!(expr.sql.ends_with("LIMIT 1)"));
    }

    #[test]
    fn mm_links_count_queries_edges_only() {
        let schema = mm_schema();
        let registry = FunctionRegistry::standard();
        let spec = LinkSpec {
            kind: LinkKind::ManyToMany,
            related_table_id: "subtasks".to_owned(),
            symmetric_column_id: None,
            fk_column_name: None,
        };
        let expr = links_count(&ctx(&schema, &registry), "subtasks", &spec).expect("compile");
        assert_eq!(
            expr.sql,
            "(SELECT COUNT(*) FROM \"gs_links\" \"lk\" WHERE \"lk\".\"link_field_id\" = ? \
             AND \"lk\".\"source_record_id\" = \"base\".\"id\")"
        );
    }

    #[test]
    fn bt_links_count_is_a_case_expression() {
        let schema = mm_schema();
        let registry = FunctionRegistry::standard();
        let spec = LinkSpec {
            kind: LinkKind::BelongsTo,
            related_table_id: "subtasks".to_owned(),
            symmetric_column_id: None,
            fk_column_name: Some("subtask_id".to_owned()),
        };
        let expr = links_count(&ctx(&schema, &registry), "ref", &spec).expect("compile");
        assert_eq!(
            expr.sql,
            "CASE WHEN \"base\".\"data\" ->> 'subtask_id' IS NOT NULL THEN 1 ELSE 0 END"
        );
    }
}
