//! Condition compiler: filter trees → WHERE predicates.
//!
//! Groups lower to parenthesized conjunctions/disjunctions, leaves to one
//! parameterized comparison each. Virtual columns resolve to their compiled
//! fragment first, then the operator applies against it. In permissive mode
//! an unresolvable leaf is dropped with a warning instead of failing the
//! request.

use gridstore_domain::error::{Error, Result};
use gridstore_domain::filter::{ComparisonOp, FilterLeaf, FilterNode};
use gridstore_domain::ports::SqlParam;
use gridstore_domain::schema::{Column, ColumnClass, ColumnKind};
use serde_json::Value;
use tracing::warn;

use crate::column_ref;
use crate::context::QueryContext;
use crate::fragment::SqlExpr;

/// Compile filter trees into one WHERE predicate. Multiple trees are
/// implicitly ANDed. `None` means no constraint survived compilation.
pub fn compile(ctx: &QueryContext<'_>, nodes: &[FilterNode]) -> Result<Option<SqlExpr>> {
    let mut parts = Vec::new();
    for node in nodes {
        if let Some(expr) = node_expr(ctx, node)? {
            parts.push(expr);
        }
    }
    Ok(combine(parts, "AND"))
}

fn combine(parts: Vec<SqlExpr>, op: &str) -> Option<SqlExpr> {
    match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(SqlExpr::join(parts, &format!(" {op} ")).grouped()),
    }
}

fn node_expr(ctx: &QueryContext<'_>, node: &FilterNode) -> Result<Option<SqlExpr>> {
    match node {
        FilterNode::Group(group) => {
            let mut parts = Vec::new();
            for child in &group.children {
                if let Some(expr) = node_expr(ctx, child)? {
                    parts.push(expr);
                }
            }
            Ok(combine(parts, group.op.as_sql()))
        }
        FilterNode::Leaf(leaf) => leaf_expr(ctx, leaf),
    }
}

fn leaf_expr(ctx: &QueryContext<'_>, leaf: &FilterLeaf) -> Result<Option<SqlExpr>> {
    let column = match ctx.table.column(&leaf.column) {
        Some(column) => column,
        None if !ctx.policy.strict => {
            warn!(column = %leaf.column, "dropping filter on unknown column");
            return Ok(None);
        }
        None => {
            return Err(Error::not_found(format!(
                "filter column {} on table {}",
                leaf.column, ctx.table.id
            )));
        }
    };

    match operator_expr(ctx, column, leaf) {
        Ok(expr) => Ok(Some(expr)),
        Err(err) if !ctx.policy.strict => {
            warn!(column = %column.id, error = %err, "dropping uncompilable filter leaf");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn operator_expr(ctx: &QueryContext<'_>, column: &Column, leaf: &FilterLeaf) -> Result<SqlExpr> {
    let compared = ctx.column_expr_cast(column)?;
    match leaf.op {
        ComparisonOp::Eq if leaf.value.is_null() => {
            Ok(SqlExpr::bind(format!("{} IS NULL", compared.sql), compared.params))
        }
        ComparisonOp::Neq if leaf.value.is_null() => Ok(SqlExpr::bind(
            format!("{} IS NOT NULL", compared.sql),
            compared.params,
        )),
        ComparisonOp::Eq => Ok(binary(compared, "=", value_param(column, &leaf.value))),
        ComparisonOp::Neq => Ok(binary(compared, "<>", value_param(column, &leaf.value))),
        ComparisonOp::Lt => Ok(binary(compared, "<", value_param(column, &leaf.value))),
        ComparisonOp::Lte => Ok(binary(compared, "<=", value_param(column, &leaf.value))),
        ComparisonOp::Gt => Ok(binary(compared, ">", value_param(column, &leaf.value))),
        ComparisonOp::Gte => Ok(binary(compared, ">=", value_param(column, &leaf.value))),
        ComparisonOp::Like | ComparisonOp::Nlike => {
            let text = text_expr(ctx, column)?;
            let needle = format!("%{}%", value_text(&leaf.value));
            let negate = if leaf.op == ComparisonOp::Nlike { "NOT " } else { "" };
            let mut params = text.params;
            params.push(SqlParam::String(needle));
            Ok(SqlExpr::bind(
                format!("{negate}(({})::text ILIKE ?)", text.sql),
                params,
            ))
        }
        ComparisonOp::Null => Ok(SqlExpr::bind(
            format!("{} IS NULL", compared.sql),
            compared.params,
        )),
        ComparisonOp::NotNull => Ok(SqlExpr::bind(
            format!("{} IS NOT NULL", compared.sql),
            compared.params,
        )),
        ComparisonOp::Empty | ComparisonOp::NotEmpty => {
            let text = text_expr(ctx, column)?;
            let mut params = text.params.clone();
            params.extend(text.params.clone());
            let empty = SqlExpr::bind(
                format!("({e} IS NULL OR ({e})::text = '')", e = text.sql),
                params,
            );
            if leaf.op == ComparisonOp::Empty {
                Ok(empty)
            } else {
                Ok(SqlExpr::bind(format!("NOT {}", empty.sql), empty.params))
            }
        }
        ComparisonOp::In | ComparisonOp::NotIn => {
            let text = text_expr(ctx, column)?;
            let values = string_list(&leaf.value);
            let negate = if leaf.op == ComparisonOp::NotIn { "NOT " } else { "" };
            let mut params = text.params;
            params.push(SqlParam::StringArray(values));
            Ok(SqlExpr::bind(
                format!("{negate}(({})::text = ANY(?))", text.sql),
                params,
            ))
        }
        ComparisonOp::Between | ComparisonOp::NotBetween => {
            let Value::Array(bounds) = &leaf.value else {
                return Err(Error::bad_request("between expects a 2-element array"));
            };
            let [low, high] = bounds.as_slice() else {
                return Err(Error::bad_request("between expects a 2-element array"));
            };
            let negate = if leaf.op == ComparisonOp::NotBetween { "NOT " } else { "" };
            let mut params = compared.params;
            let low = value_param(column, low);
            let high = value_param(column, high);
            params.extend(low.params);
            params.extend(high.params);
            Ok(SqlExpr::bind(
                format!("{negate}({} BETWEEN ? AND ?)", compared.sql),
                params,
            ))
        }
        ComparisonOp::AllOf | ComparisonOp::AnyOf | ComparisonOp::NAllOf | ComparisonOp::NAnyOf => {
            if column.kind.is_virtual() || column.class() != ColumnClass::User {
                return Err(Error::bad_request(
                    "multi-select operators require a stored column",
                ));
            }
            let json = column_ref::column_json_expr(column, &ctx.alias)?;
            let function = match leaf.op {
                ComparisonOp::AllOf | ComparisonOp::NAllOf => "jsonb_exists_all",
                _ => "jsonb_exists_any",
            };
            let negate = matches!(leaf.op, ComparisonOp::NAllOf | ComparisonOp::NAnyOf);
            let prefix = if negate { "NOT " } else { "" };
            let mut params = json.params;
            params.push(SqlParam::StringArray(string_list(&leaf.value)));
            Ok(SqlExpr::bind(
                format!("{prefix}{function}({}, ?)", json.sql),
                params,
            ))
        }
    }
}

fn binary(left: SqlExpr, op: &str, right: SqlExpr) -> SqlExpr {
    let mut params = left.params;
    params.extend(right.params);
    SqlExpr::bind(format!("{} {op} {}", left.sql, right.sql), params)
}

/// Uncast textual expression for contains/membership operators.
fn text_expr(ctx: &QueryContext<'_>, column: &Column) -> Result<SqlExpr> {
    if column.kind.is_virtual() {
        ctx.virtual_expr(column)
    } else {
        column_ref::column_expr(column, ctx.table, &ctx.alias)
    }
}

/// Bind a literal value as a parameter coerced to the column's comparison
/// type. Virtual columns carry no storage type, so their comparisons bind
/// by the value's own shape instead.
fn value_param(column: &Column, value: &Value) -> SqlExpr {
    let param = if column.kind.is_virtual() {
        match value {
            Value::Null => SqlParam::Null,
            Value::Number(n) => n.as_f64().map_or(SqlParam::Null, SqlParam::F64),
            Value::Bool(b) => SqlParam::Bool(*b),
            Value::String(s) => SqlParam::string(s),
            other => SqlParam::String(other.to_string()),
        }
    } else {
        match (&column.kind, value) {
            (_, Value::Null) => SqlParam::Null,
            (ColumnKind::Checkbox, v) => SqlParam::Bool(truthy(v)),
            (kind, v) if kind.is_numeric() => match numeric(v) {
                Some(n) => SqlParam::F64(n),
                None => SqlParam::Null,
            },
            (_, Value::String(s)) => SqlParam::string(s),
            (_, Value::Number(n)) => SqlParam::String(n.to_string()),
            (_, Value::Bool(b)) => SqlParam::String(b.to_string()),
            (_, other) => SqlParam::String(other.to_string()),
        }
    };
    SqlExpr::param(param)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(s.as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(true) => Some(1.0),
        Value::Bool(false) => Some(0.0),
        _ => None,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Array membership values: arrays element-wise, strings comma-split.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(value_text).collect(),
        Value::String(s) => s.split(',').map(|part| part.trim().to_owned()).collect(),
        other => vec![value_text(other)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::registry::FunctionRegistry;
    use gridstore_domain::filter::LogicalOp;
    use gridstore_domain::schema::{Schema, Table};
    use serde_json::json;

    fn schema() -> Schema {
        let column = |id: &str, kind: ColumnKind| Column {
            id: id.to_owned(),
            title: id.to_owned(),
            name: id.to_owned(),
            kind,
            pk: false,
            required: false,
            default: None,
        };
        Schema {
            tables: vec![Table {
                id: "t1".to_owned(),
                title: "T1".to_owned(),
                prefix: None,
                columns: vec![
                    column("title", ColumnKind::Text),
                    column("priority", ColumnKind::Number),
                    column("tags", ColumnKind::MultiSelect { options: vec![] }),
                ],
                is_junction: false,
                deleted: false,
            }],
        }
    }

    fn compile_one(node: FilterNode) -> SqlExpr {
        let schema = schema();
        let registry = FunctionRegistry::standard();
        let table = schema.table("t1").expect("table");
        let ctx = QueryContext::new(&schema, table, &registry);
        compile(&ctx, &[node]).expect("compile").expect("some")
    }

    #[test]
    fn numeric_comparisons_bind_cast_values() {
        let expr = compile_one(FilterNode::leaf("priority", ComparisonOp::Gte, json!("3")));
        assert_eq!(
            expr.sql,
            "CAST(NULLIF(\"base\".\"data\" ->> 'priority', '') AS NUMERIC) >= ?"
        );
        assert_eq!(expr.params, vec![SqlParam::F64(3.0)]);
    }

    #[test]
    fn like_is_case_insensitive_contains() {
        let expr = compile_one(FilterNode::leaf("title", ComparisonOp::Like, json!("urgent")));
        assert_eq!(
            expr.sql,
            "((\"base\".\"data\" ->> 'title')::text ILIKE ?)"
        );
        assert_eq!(expr.params, vec![SqlParam::string("%urgent%")]);
    }

    #[test]
    fn groups_nest_with_their_own_operator() {
        let node = FilterNode::group(
            LogicalOp::Or,
            vec![
                FilterNode::leaf("priority", ComparisonOp::Gt, json!(3)),
                FilterNode::group(
                    LogicalOp::And,
                    vec![
                        FilterNode::leaf("title", ComparisonOp::NotEmpty, json!(null)),
                        FilterNode::leaf("priority", ComparisonOp::Lte, json!(1)),
                    ],
                ),
            ],
        );
        let expr = compile_one(node);
        assert!(expr.sql.contains(" OR "));
        assert!(expr.sql.contains(" AND "));
        assert!(expr.sql.starts_with('('));
    }

    #[test]
    fn in_operator_splits_string_values() {
        let expr = compile_one(FilterNode::leaf("title", ComparisonOp::In, json!("a, b,c")));
        assert_eq!(
            expr.params,
            vec![SqlParam::StringArray(vec![
                "a".to_owned(),
                "b".to_owned(),
                "c".to_owned()
            ])]
        );
        assert!(expr.sql.contains("= ANY(?)"));
    }

    #[test]
    fn multi_select_operators_use_jsonb_functions() {
        let expr = compile_one(FilterNode::leaf(
            "tags",
            ComparisonOp::AllOf,
            json!(["red", "blue"]),
        ));
        assert_eq!(
            expr.sql,
            "jsonb_exists_all(\"base\".\"data\" -> 'tags', ?)"
        );
        let expr = compile_one(FilterNode::leaf("tags", ComparisonOp::NAnyOf, json!("x,y")));
        assert!(expr.sql.starts_with("NOT jsonb_exists_any("));
    }

    #[test]
    fn unknown_column_is_dropped_in_permissive_mode() {
        let schema = schema();
        let registry = FunctionRegistry::standard();
        let table = schema.table("t1").expect("table");
        let ctx = QueryContext::new(&schema, table, &registry);
        let out = compile(
            &ctx,
            &[FilterNode::leaf("ghost", ComparisonOp::Eq, json!(1))],
        )
        .expect("compile");
        assert!(out.is_none());
    }

    #[test]
    fn unknown_column_errors_in_strict_mode() {
        let schema = schema();
        let registry = FunctionRegistry::standard();
        let table = schema.table("t1").expect("table");
        let ctx = QueryContext::new(&schema, table, &registry)
            .with_policy(crate::context::CompilePolicy { strict: true });
        assert!(
            compile(
                &ctx,
                &[FilterNode::leaf("ghost", ComparisonOp::Eq, json!(1))],
            )
            .is_err()
        );
    }

    #[test]
    fn eq_null_becomes_is_null() {
        let expr = compile_one(FilterNode::leaf("title", ComparisonOp::Eq, json!(null)));
        assert!(expr.sql.ends_with("IS NULL"));
        assert!(expr.params.is_empty());
    }

    #[test]
    fn between_binds_both_bounds() {
        let expr = compile_one(FilterNode::leaf(
            "priority",
            ComparisonOp::Between,
            json!([1, 5]),
        ));
        assert!(expr.sql.contains("BETWEEN ? AND ?"));
        assert_eq!(
            expr.params,
            vec![SqlParam::F64(1.0), SqlParam::F64(5.0)]
        );
    }
}
