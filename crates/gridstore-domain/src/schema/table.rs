//! Logical table model.

use serde::{Deserialize, Serialize};

use super::column::{Column, LinkSpec};

/// A user-defined logical table. The unit of isolation: every physical row
/// carries its owning table's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Stable id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Storage-name prefix applied to newly created columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Columns, order-significant.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Reserved: pure-association tables for MM-as-column.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_junction: bool,
    /// Soft-delete flag.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl Table {
    /// Look up a column by id, then title, then storage name.
    #[must_use]
    pub fn column(&self, key: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.id == key)
            .or_else(|| self.columns.iter().find(|c| c.title == key))
            .or_else(|| self.columns.iter().find(|c| c.name == key))
    }

    /// Look up a column by id only.
    #[must_use]
    pub fn column_by_id(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Mutable column lookup by id.
    pub fn column_by_id_mut(&mut self, id: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.id == id)
    }

    /// The declared primary-key column, if any. Absent one, the physical
    /// `id` column acts as the key.
    #[must_use]
    pub fn pk_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.pk)
    }

    /// All link columns with their specs.
    pub fn link_columns(&self) -> impl Iterator<Item = (&Column, &LinkSpec)> {
        self.columns
            .iter()
            .filter_map(|c| c.kind.link_spec().map(|spec| (c, spec)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::column::ColumnKind;

    fn table_with(columns: Vec<Column>) -> Table {
        Table {
            id: "t1".to_owned(),
            title: "T1".to_owned(),
            prefix: None,
            columns,
            is_junction: false,
            deleted: false,
        }
    }

    fn column(id: &str, title: &str, name: &str) -> Column {
        Column {
            id: id.to_owned(),
            title: title.to_owned(),
            name: name.to_owned(),
            kind: ColumnKind::Text,
            pk: false,
            required: false,
            default: None,
        }
    }

    #[test]
    fn lookup_prefers_id_over_title_over_name() {
        let t = table_with(vec![
            column("c1", "Alpha", "alpha"),
            column("c2", "c1", "beta"),
            column("c3", "Gamma", "c1"),
        ]);
        // All three could match "c1"; the id match wins.
        assert_eq!(t.column("c1").map(|c| c.id.as_str()), Some("c1"));
        assert_eq!(t.column("Alpha").map(|c| c.id.as_str()), Some("c1"));
        assert_eq!(t.column("beta").map(|c| c.id.as_str()), Some("c2"));
        assert!(t.column("missing").is_none());
    }
}
