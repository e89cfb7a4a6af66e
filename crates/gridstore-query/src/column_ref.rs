//! SQL-fragment layer: column references and casts.
//!
//! Pure functions producing the SQL expression for one column of one
//! aliased table. System and junction-table columns address fixed physical
//! columns; user columns extract from the JSON blob; the cast variant wraps
//! the extractor so comparisons and arithmetic see typed values.

use gridstore_domain::constants::{LINKS_TABLE, RECORDS_TABLE};
use gridstore_domain::error::Result;
use gridstore_domain::sanitize;
use gridstore_domain::schema::{Column, ColumnClass, ColumnKind, Table};

use crate::fragment::SqlExpr;

/// Physical table backing a logical table: the links table for junction
/// tables, the records table for everything else.
#[must_use]
pub fn physical_table(table: &Table) -> &'static str {
    if table.is_junction {
        LINKS_TABLE
    } else {
        RECORDS_TABLE
    }
}

/// SQL type a column kind casts to, when it has one.
#[must_use]
pub fn cast_type(kind: &ColumnKind) -> Option<&'static str> {
    match kind {
        ColumnKind::Number | ColumnKind::AutoNumber | ColumnKind::Duration => Some("NUMERIC"),
        ColumnKind::Decimal | ColumnKind::Currency | ColumnKind::Percent | ColumnKind::Rating => {
            Some("DECIMAL")
        }
        ColumnKind::Checkbox => Some("BOOLEAN"),
        ColumnKind::Date => Some("DATE"),
        ColumnKind::DateTime => Some("TIMESTAMPTZ"),
        ColumnKind::Time => Some("TIME"),
        _ => None,
    }
}

/// `"<alias>"."<physical>"` for system/junction columns,
/// `"<alias>"."data" ->> '<name>'` for user columns.
pub fn column_expr(column: &Column, table: &Table, alias: &str) -> Result<SqlExpr> {
    let alias = sanitize::ensure_alias(alias)?;
    if table.is_junction || column.class() == ColumnClass::System {
        let physical = column
            .system_field()
            .map_or(column.name.as_str(), |f| f.physical_name());
        let quoted = sanitize::quote_ident(physical)?;
        return Ok(SqlExpr::raw(format!("\"{alias}\".{quoted}")));
    }
    let name = sanitize::ensure_storage_name(&column.name)?;
    Ok(SqlExpr::raw(format!("\"{alias}\".\"data\" ->> '{name}'")))
}

/// JSON-valued extraction (`->` instead of `->>`), for operators that work
/// on the JSON document itself (multi-select containment).
pub fn column_json_expr(column: &Column, alias: &str) -> Result<SqlExpr> {
    let alias = sanitize::ensure_alias(alias)?;
    let name = sanitize::ensure_storage_name(&column.name)?;
    Ok(SqlExpr::raw(format!("\"{alias}\".\"data\" -> '{name}'")))
}

/// [`column_expr`] wrapped in `CAST(NULLIF(expr, '') AS <type>)` for kinds
/// that compare typed. Empty strings map to NULL before the cast so
/// arithmetic over unset values stays NULL instead of erroring.
/// System/junction columns are returned uncast; they are typed already.
pub fn column_expr_cast(column: &Column, table: &Table, alias: &str) -> Result<SqlExpr> {
    let expr = column_expr(column, table, alias)?;
    if table.is_junction || column.class() == ColumnClass::System {
        return Ok(expr);
    }
    match cast_type(&column.kind) {
        Some(sql_type) => Ok(SqlExpr::raw(format!(
            "CAST(NULLIF({}, '') AS {sql_type})",
            expr.sql
        ))),
        None => Ok(expr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table {
            id: "t1".to_owned(),
            title: "T1".to_owned(),
            prefix: None,
            columns: Vec::new(),
            is_junction: false,
            deleted: false,
        }
    }

    fn column(name: &str, kind: ColumnKind) -> Column {
        Column {
            id: name.to_owned(),
            title: name.to_owned(),
            name: name.to_owned(),
            kind,
            pk: false,
            required: false,
            default: None,
        }
    }

    #[test]
    fn user_columns_extract_from_the_blob() {
        let expr = column_expr(&column("title", ColumnKind::Text), &table(), "base")
            .expect("compile");
        assert_eq!(expr.sql, "\"base\".\"data\" ->> 'title'");
    }

    #[test]
    fn system_columns_address_physical_fields() {
        let expr = column_expr(&column("created", ColumnKind::CreatedTime), &table(), "base")
            .expect("compile");
        assert_eq!(expr.sql, "\"base\".\"created_at\"");
    }

    #[test]
    fn pk_column_maps_to_id() {
        let mut pk = column("code", ColumnKind::Text);
        pk.pk = true;
        let expr = column_expr(&pk, &table(), "base").expect("compile");
        assert_eq!(expr.sql, "\"base\".\"id\"");
    }

    #[test]
    fn casts_wrap_nullif() {
        let expr = column_expr_cast(&column("rating", ColumnKind::Number), &table(), "base")
            .expect("compile");
        assert_eq!(
            expr.sql,
            "CAST(NULLIF(\"base\".\"data\" ->> 'rating', '') AS NUMERIC)"
        );
    }

    #[test]
    fn uncastable_kinds_stay_text() {
        let expr = column_expr_cast(&column("title", ColumnKind::Text), &table(), "base")
            .expect("compile");
        assert_eq!(expr.sql, "\"base\".\"data\" ->> 'title'");
    }

    #[test]
    fn invalid_alias_is_rejected() {
        assert!(column_expr(&column("a", ColumnKind::Text), &table(), "bad alias").is_err());
    }
}
