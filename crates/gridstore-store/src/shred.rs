//! Shredding and deshredding.
//!
//! Shredding takes a logical record and splits it for storage: values are
//! sanitized and coerced to their column's logical type, system keys are
//! routed to fixed physical columns, virtual keys are dropped, and
//! everything else lands in the JSON blob under its storage name, unknown
//! keys included, as-is. Deshredding merges a physical row back into the
//! flat logical shape.

use chrono::{DateTime, Utc};
use gridstore_domain::constants::records;
use gridstore_domain::error::{Error, Result};
use gridstore_domain::ports::SqlRow;
use gridstore_domain::record::Record;
use gridstore_domain::sanitize;
use gridstore_domain::schema::{Column, ColumnClass, ColumnKind, SystemField, Table};
use serde_json::{Map, Value};

/// The storage-ready parts of one incoming record.
#[derive(Debug, Default, Clone)]
pub struct Shredded {
    /// Explicit id, when the caller supplied one.
    pub id: Option<String>,
    /// User-column values keyed by storage name.
    pub data: Map<String, Value>,
    /// Explicit creation actor (write-once).
    pub created_by: Option<String>,
    /// Explicit modification actor.
    pub updated_by: Option<String>,
}

/// Coerce a value to its column's logical type on write.
#[must_use]
pub fn coerce(kind: &ColumnKind, value: Value) -> Value {
    match kind {
        ColumnKind::Checkbox => Value::Bool(truthy(&value)),
        kind if kind.is_numeric() => match &value {
            Value::Number(_) => value,
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|n| serde_json::Number::from_f64(n).map(Value::Number))
                .unwrap_or(Value::Null),
            _ => Value::Null,
        },
        ColumnKind::Json => match &value {
            Value::String(s) => serde_json::from_str(s).unwrap_or(value),
            _ => value,
        },
        ColumnKind::MultiSelect { .. } => match value {
            Value::Array(_) => value,
            Value::String(s) => {
                if let Ok(parsed @ Value::Array(_)) = serde_json::from_str(&s) {
                    parsed
                } else {
                    Value::Array(
                        s.split(',')
                            .map(|part| Value::String(part.trim().to_owned()))
                            .collect(),
                    )
                }
            }
            Value::Null => Value::Null,
            other => Value::Array(vec![other]),
        },
        _ => value,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(s.as_str(), "true" | "1" | "yes" | "on"),
        _ => false,
    }
}

/// Split a sanitized input record into its physical parts.
///
/// Keys are matched against columns by id, title or storage name. Virtual
/// columns are dropped, system columns route to their physical field, user
/// columns are coerced and stored under their storage name. Keys matching
/// no column stay in the blob untouched.
#[must_use]
pub fn shred(table: &Table, input: Record) -> Shredded {
    let sanitized = sanitize::sanitize_value(Value::Object(input));
    let Value::Object(fields) = sanitized else {
        return Shredded::default();
    };

    let mut out = Shredded::default();
    for (key, value) in fields {
        match table.column(&key) {
            Some(column) => match column.class() {
                ColumnClass::Virtual => {}
                ColumnClass::System => route_system(&mut out, column, value),
                ColumnClass::User => {
                    out.data
                        .insert(column.name.clone(), coerce(&column.kind, value));
                }
            },
            // Direct hits on the physical field names behave like system
            // columns even without a declared column.
            None => match key.as_str() {
                records::ID => out.id = string_or_none(value),
                records::CREATED_BY => out.created_by = string_or_none(value),
                records::UPDATED_BY => out.updated_by = string_or_none(value),
                records::CREATED_AT | records::UPDATED_AT | records::TABLE_ID => {}
                _ => {
                    out.data.insert(key, value);
                }
            },
        }
    }
    out
}

fn route_system(out: &mut Shredded, column: &Column, value: Value) {
    match column.system_field() {
        Some(SystemField::Id) => out.id = string_or_none(value),
        Some(SystemField::CreatedBy) => out.created_by = string_or_none(value),
        Some(SystemField::UpdatedBy) => out.updated_by = string_or_none(value),
        // Timestamps are server-assigned; incoming values are dropped.
        Some(SystemField::CreatedAt | SystemField::UpdatedAt) | None => {}
    }
}

fn string_or_none(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// Fill declared column defaults into a shredded blob for keys the caller
/// did not send. Insert-only; updates never re-apply defaults.
pub fn apply_defaults(table: &Table, data: &mut Map<String, Value>) {
    for column in &table.columns {
        if column.class() != ColumnClass::User {
            continue;
        }
        if let Some(default) = &column.default {
            if !data.contains_key(&column.name) {
                data.insert(column.name.clone(), coerce(&column.kind, default.clone()));
            }
        }
    }
}

/// Read any typed value from a row column.
#[must_use]
pub fn row_value(row: &dyn SqlRow, name: &str) -> Option<Value> {
    if let Ok(Some(v)) = row.try_get_json(name) {
        return Some(v);
    }
    if let Ok(Some(v)) = row.try_get_i64(name) {
        return Some(Value::from(v));
    }
    if let Ok(Some(v)) = row.try_get_f64(name) {
        return Some(Value::from(v));
    }
    if let Ok(Some(v)) = row.try_get_bool(name) {
        return Some(Value::Bool(v));
    }
    if let Ok(Some(v)) = row.try_get_timestamp(name) {
        return Some(Value::String(v.to_rfc3339()));
    }
    if let Ok(Some(v)) = row.try_get_string(name) {
        return Some(Value::String(v));
    }
    None
}

/// Merge a physical row back into the flat logical record: blob keys first,
/// system fields on top, then any requested virtual projections.
pub fn deshred(
    table: &Table,
    row: &dyn SqlRow,
    fields: Option<&[String]>,
    virtual_aliases: &[(String, String)],
) -> Result<Record> {
    let mut record = Record::new();

    if let Some(Value::Object(blob)) = row
        .try_get_json(records::DATA)
        .map_err(|e| Error::internal(format!("records row is missing its data blob: {e}")))?
    {
        for (key, value) in blob {
            if let Some(wanted) = fields {
                let keep = wanted.iter().any(|f| {
                    f == &key
                        || table
                            .column(f)
                            .is_some_and(|c| c.name == key)
                });
                if !keep {
                    continue;
                }
            }
            record.insert(key, value);
        }
    }

    record.insert(
        records::ID.to_owned(),
        Value::String(required_string(row, records::ID)?),
    );
    if let Some(ts) = timestamp(row, records::CREATED_AT) {
        record.insert(records::CREATED_AT.to_owned(), ts);
    }
    if let Some(ts) = timestamp(row, records::UPDATED_AT) {
        record.insert(records::UPDATED_AT.to_owned(), ts);
    }
    for actor in [records::CREATED_BY, records::UPDATED_BY] {
        if let Ok(Some(v)) = row.try_get_string(actor) {
            record.insert(actor.to_owned(), Value::String(v));
        }
    }

    for (alias, output_key) in virtual_aliases {
        let value = row_value(row, alias).unwrap_or(Value::Null);
        record.insert(output_key.clone(), value);
    }

    Ok(record)
}

fn required_string(row: &dyn SqlRow, name: &str) -> Result<String> {
    row.try_get_string(name)?
        .ok_or_else(|| Error::internal(format!("records row is missing {name}")))
}

fn timestamp(row: &dyn SqlRow, name: &str) -> Option<Value> {
    match row.try_get_timestamp(name) {
        Ok(Some(ts)) => Some(Value::String(ts.to_rfc3339())),
        _ => match row.try_get_string(name) {
            Ok(Some(s)) => Some(Value::String(s)),
            _ => None,
        },
    }
}

/// Current wall-clock, separated so write paths stamp consistently.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridstore_domain::schema::Column;
    use serde_json::json;

    fn table() -> Table {
        let column = |id: &str, kind: ColumnKind| Column {
            id: id.to_owned(),
            title: id.to_owned(),
            name: id.to_owned(),
            kind,
            pk: false,
            required: false,
            default: None,
        };
        Table {
            id: "t1".to_owned(),
            title: "T1".to_owned(),
            prefix: None,
            columns: vec![
                column("title", ColumnKind::Text),
                column("rating", ColumnKind::Number),
                column("done", ColumnKind::Checkbox),
                column("tags", ColumnKind::MultiSelect { options: vec![] }),
                column(
                    "total",
                    ColumnKind::Formula {
                        expression: "1".to_owned(),
                    },
                ),
            ],
            is_junction: false,
            deleted: false,
        }
    }

    #[test]
    fn coercion_follows_column_kind() {
        assert_eq!(coerce(&ColumnKind::Checkbox, json!("1")), json!(true));
        assert_eq!(coerce(&ColumnKind::Number, json!("5")), json!(5.0));
        assert_eq!(coerce(&ColumnKind::Number, json!("abc")), json!(null));
        assert_eq!(
            coerce(&ColumnKind::MultiSelect { options: vec![] }, json!("a, b")),
            json!(["a", "b"])
        );
        assert_eq!(
            coerce(&ColumnKind::Json, json!("{\"k\":1}")),
            json!({"k": 1})
        );
    }

    #[test]
    fn shred_routes_classes_and_keeps_unknown_keys() {
        let mut input = Record::new();
        input.insert("title".to_owned(), json!("hello"));
        input.insert("rating".to_owned(), json!("5"));
        input.insert("total".to_owned(), json!(99));
        input.insert("id".to_owned(), json!("rec_1"));
        input.insert("mystery".to_owned(), json!("kept"));

        let shredded = shred(&table(), input);
        assert_eq!(shredded.id.as_deref(), Some("rec_1"));
        assert_eq!(shredded.data.get("title"), Some(&json!("hello")));
        assert_eq!(shredded.data.get("rating"), Some(&json!(5.0)));
        // Virtual keys never reach storage.
        assert!(!shredded.data.contains_key("total"));
        assert_eq!(shredded.data.get("mystery"), Some(&json!("kept")));
    }

    #[test]
    fn shred_sanitizes_before_separating() {
        let mut input = Record::new();
        input.insert("title".to_owned(), json!("<script>x</script>clean"));
        let shredded = shred(&table(), input);
        assert_eq!(shredded.data.get("title"), Some(&json!("clean")));
    }
}
