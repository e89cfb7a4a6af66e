//! In-memory schema editor.
//!
//! All operations mutate the snapshot in memory; persistence is the schema
//! store's concern. Operations keep the schema self-consistent: dropping a
//! table strips the link columns that point at it, dropping one side of a
//! bidirectional link drops the other.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::column::{Column, ColumnKind, LinkKind, LinkSpec};
use super::table::Table;
use crate::error::{Error, Result};
use crate::ids;
use crate::sanitize;

/// A full logical schema: the set of live tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Tables, in creation order.
    pub tables: Vec<Table>,
}

/// Input for [`Schema::create_table`].
#[derive(Debug, Clone, Default)]
pub struct TableInit {
    /// Explicit id; derived from the title when absent.
    pub id: Option<String>,
    /// Display title.
    pub title: String,
    /// Storage-name prefix for columns.
    pub prefix: Option<String>,
    /// Initial columns.
    pub columns: Vec<ColumnInit>,
    /// Reserved junction flag.
    pub is_junction: bool,
}

/// Input for [`Schema::add_column`].
#[derive(Debug, Clone)]
pub struct ColumnInit {
    /// Explicit id; server-assigned when absent.
    pub id: Option<String>,
    /// Display title.
    pub title: String,
    /// Explicit storage name; derived from the title when absent.
    pub name: Option<String>,
    /// Logical type.
    pub kind: ColumnKind,
    /// Primary-key flag.
    pub pk: bool,
    /// Required flag.
    pub required: bool,
    /// Default value.
    pub default: Option<Value>,
}

impl ColumnInit {
    /// A plain column of the given kind.
    pub fn new(title: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            id: None,
            title: title.into(),
            name: None,
            kind,
            pk: false,
            required: false,
            default: None,
        }
    }
}

/// Field-wise table update; only provided keys are replaced.
#[derive(Debug, Clone, Default)]
pub struct TablePatch {
    /// New title.
    pub title: Option<String>,
    /// New prefix.
    pub prefix: Option<Option<String>>,
    /// New soft-delete state.
    pub deleted: Option<bool>,
}

/// Field-wise column update; only provided keys are replaced.
#[derive(Debug, Clone, Default)]
pub struct ColumnPatch {
    /// New title.
    pub title: Option<String>,
    /// New storage name.
    pub name: Option<String>,
    /// New logical type.
    pub kind: Option<ColumnKind>,
    /// New required flag.
    pub required: Option<bool>,
    /// New default value.
    pub default: Option<Option<Value>>,
}

/// Input for [`Schema::create_link`].
#[derive(Debug, Clone)]
pub struct LinkRequest {
    /// Table the link column is created on.
    pub source_table_id: String,
    /// Table the link points at.
    pub target_table_id: String,
    /// Title of the new column.
    pub title: String,
    /// Relation kind.
    pub kind: LinkKind,
    /// Whether to create the inverse column on the target table.
    pub bidirectional: bool,
    /// Title for the inverse column; derived from the source table's title
    /// when absent.
    pub inverse_title: Option<String>,
}

impl Schema {
    /// Look up a live table by id.
    pub fn table(&self, id: &str) -> Result<&Table> {
        self.tables
            .iter()
            .find(|t| t.id == id && !t.deleted)
            .ok_or_else(|| Error::not_found(format!("table {id}")))
    }

    fn table_mut(&mut self, id: &str) -> Result<&mut Table> {
        self.tables
            .iter_mut()
            .find(|t| t.id == id && !t.deleted)
            .ok_or_else(|| Error::not_found(format!("table {id}")))
    }

    /// Look up a live table by title.
    #[must_use]
    pub fn table_by_title(&self, title: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.title == title && !t.deleted)
    }

    /// Create a table. The id is derived from the title unless supplied;
    /// a duplicate id is a conflict.
    pub fn create_table(&mut self, init: TableInit) -> Result<&Table> {
        let id = match init.id {
            Some(id) => id,
            None => sanitize::storage_name_from_title(&init.title),
        };
        if self.tables.iter().any(|t| t.id == id) {
            return Err(Error::conflict(format!("table {id} already exists")));
        }
        let mut table = Table {
            id,
            title: init.title,
            prefix: init.prefix,
            columns: Vec::new(),
            is_junction: init.is_junction,
            deleted: false,
        };
        for col in init.columns {
            let normalized = normalize_column(&table, col)?;
            table.columns.push(normalized);
        }
        self.tables.push(table);
        let index = self.tables.len() - 1;
        Ok(&self.tables[index])
    }

    /// Append a normalized column; a duplicate id is a conflict.
    pub fn add_column(&mut self, table_id: &str, init: ColumnInit) -> Result<&Column> {
        let table = self.table_mut(table_id)?;
        let column = normalize_column(table, init)?;
        table.columns.push(column);
        let index = table.columns.len() - 1;
        Ok(&table.columns[index])
    }

    /// Replace the provided table fields.
    pub fn update_table(&mut self, id: &str, patch: TablePatch) -> Result<()> {
        let table = self.table_mut(id)?;
        if let Some(title) = patch.title {
            table.title = title;
        }
        if let Some(prefix) = patch.prefix {
            table.prefix = prefix;
        }
        if let Some(deleted) = patch.deleted {
            table.deleted = deleted;
        }
        Ok(())
    }

    /// Replace the provided column fields.
    pub fn update_column(&mut self, table_id: &str, id: &str, patch: ColumnPatch) -> Result<()> {
        let table = self.table_mut(table_id)?;
        let column = table
            .column_by_id_mut(id)
            .ok_or_else(|| Error::not_found(format!("column {id}")))?;
        if let Some(title) = patch.title {
            column.title = title;
        }
        if let Some(name) = patch.name {
            sanitize::ensure_storage_name(&name)?;
            column.name = name;
        }
        if let Some(kind) = patch.kind {
            column.kind = kind;
        }
        if let Some(required) = patch.required {
            column.required = required;
        }
        if let Some(default) = patch.default {
            column.default = default;
        }
        Ok(())
    }

    /// Remove a table, and strip link columns elsewhere whose related table
    /// is the one being dropped, keeping the schema referentially sound.
    pub fn drop_table(&mut self, id: &str) -> Result<Table> {
        let position = self
            .tables
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| Error::not_found(format!("table {id}")))?;
        let removed = self.tables.remove(position);
        for table in &mut self.tables {
            table
                .columns
                .retain(|c| c.kind.link_spec().is_none_or(|s| s.related_table_id != id));
        }
        Ok(removed)
    }

    /// Remove a column. Dropping one side of a bidirectional link also
    /// removes the symmetric partner on the related table.
    pub fn drop_column(&mut self, table_id: &str, id: &str) -> Result<()> {
        let table = self.table(table_id)?;
        let column = table
            .column_by_id(id)
            .ok_or_else(|| Error::not_found(format!("column {id}")))?;
        let partner = column.kind.link_spec().and_then(|spec| {
            spec.symmetric_column_id
                .clone()
                .map(|partner_id| (spec.related_table_id.clone(), partner_id))
        });

        let table = self.table_mut(table_id)?;
        table.columns.retain(|c| c.id != id);

        if let Some((related_table_id, partner_id)) = partner {
            if let Ok(related) = self.table_mut(&related_table_id) {
                related.columns.retain(|c| c.id != partner_id);
            }
        }
        Ok(())
    }

    /// Create a link column, and its inverse when bidirectional, cross-
    /// referencing the two ids. Returns (column id, inverse column id).
    pub fn create_link(&mut self, req: LinkRequest) -> Result<(String, Option<String>)> {
        let source = self.table(&req.source_table_id)?;
        let target = self.table(&req.target_table_id)?;
        let source_title = source.title.clone();
        let target_title = target.title.clone();

        // FK-in-JSON storage name for the non-MM kinds.
        let fk_column_name = match req.kind {
            LinkKind::ManyToMany => None,
            LinkKind::HasMany => Some(format!(
                "{}_id",
                sanitize::storage_name_from_title(&source_title)
            )),
            LinkKind::BelongsTo => Some(format!(
                "{}_id",
                sanitize::storage_name_from_title(&target_title)
            )),
        };

        let column_id = ids::generate();
        let inverse_id = req.bidirectional.then(ids::generate);

        let spec = LinkSpec {
            kind: req.kind,
            related_table_id: req.target_table_id.clone(),
            symmetric_column_id: inverse_id.clone(),
            fk_column_name: fk_column_name.clone(),
        };
        let init = ColumnInit {
            id: Some(column_id.clone()),
            title: req.title,
            name: None,
            kind: ColumnKind::Link(spec),
            pk: false,
            required: false,
            default: None,
        };
        self.add_column(&req.source_table_id, init)?;

        if let Some(inverse_id) = inverse_id.clone() {
            let inverse_kind = match req.kind {
                LinkKind::ManyToMany => LinkKind::ManyToMany,
                LinkKind::HasMany => LinkKind::BelongsTo,
                LinkKind::BelongsTo => LinkKind::HasMany,
            };
            let inverse_spec = LinkSpec {
                kind: inverse_kind,
                related_table_id: req.source_table_id.clone(),
                symmetric_column_id: Some(column_id.clone()),
                fk_column_name,
            };
            let inverse_init = ColumnInit {
                id: Some(inverse_id),
                title: req.inverse_title.unwrap_or(source_title),
                name: None,
                kind: ColumnKind::Link(inverse_spec),
                pk: false,
                required: false,
                default: None,
            };
            self.add_column(&req.target_table_id, inverse_init)?;
        }

        Ok((column_id, inverse_id))
    }

    /// Serialize the schema for export.
    pub fn export(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Import a previously exported schema. With `merge`, tables are
    /// upserted by id; without, the current table set is replaced.
    pub fn import(&mut self, value: Value, merge: bool) -> Result<()> {
        let incoming: Schema = serde_json::from_value(value)?;
        if merge {
            for table in incoming.tables {
                match self.tables.iter_mut().find(|t| t.id == table.id) {
                    Some(existing) => *existing = table,
                    None => self.tables.push(table),
                }
            }
        } else {
            self.tables = incoming.tables;
        }
        Ok(())
    }
}

/// Normalize a column init against its table: derive id and storage name,
/// validate the name, reject duplicate ids and names.
fn normalize_column(table: &Table, init: ColumnInit) -> Result<Column> {
    let id = init.id.unwrap_or_else(ids::generate);
    if table.column_by_id(&id).is_some() {
        return Err(Error::conflict(format!("column {id} already exists")));
    }
    let name = match init.name {
        Some(name) => name,
        None => {
            let base = sanitize::storage_name_from_title(&init.title);
            match &table.prefix {
                Some(prefix) => format!("{prefix}{base}"),
                None => base,
            }
        }
    };
    sanitize::ensure_storage_name(&name)?;
    if table.columns.iter().any(|c| c.name == name) {
        return Err(Error::conflict(format!(
            "column storage name {name} already exists"
        )));
    }
    Ok(Column {
        id,
        title: init.title,
        name,
        kind: init.kind,
        pk: init.pk,
        required: init.required,
        default: init.default,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tables() -> Schema {
        let mut schema = Schema::default();
        schema
            .create_table(TableInit {
                title: "Books".to_owned(),
                columns: vec![ColumnInit::new("Title", ColumnKind::Text)],
                ..TableInit::default()
            })
            .expect("create books");
        schema
            .create_table(TableInit {
                title: "Authors".to_owned(),
                columns: vec![ColumnInit::new("Name", ColumnKind::Text)],
                ..TableInit::default()
            })
            .expect("create authors");
        schema
    }

    #[test]
    fn create_table_derives_id_and_rejects_duplicates() {
        let mut schema = two_tables();
        assert!(schema.table("books").is_ok());
        let err = schema
            .create_table(TableInit {
                title: "Books".to_owned(),
                ..TableInit::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn bidirectional_link_cross_references_ids() {
        let mut schema = two_tables();
        let (col_id, inverse_id) = schema
            .create_link(LinkRequest {
                source_table_id: "books".to_owned(),
                target_table_id: "authors".to_owned(),
                title: "Authors".to_owned(),
                kind: LinkKind::ManyToMany,
                bidirectional: true,
                inverse_title: None,
            })
            .expect("create link");
        let inverse_id = inverse_id.expect("inverse created");

        let books = schema.table("books").expect("books");
        let spec = books
            .column_by_id(&col_id)
            .and_then(|c| c.kind.link_spec())
            .expect("link spec");
        assert_eq!(spec.symmetric_column_id.as_deref(), Some(&*inverse_id));

        let authors = schema.table("authors").expect("authors");
        let inverse_spec = authors
            .column_by_id(&inverse_id)
            .and_then(|c| c.kind.link_spec())
            .expect("inverse spec");
        assert_eq!(inverse_spec.symmetric_column_id.as_deref(), Some(&*col_id));
        assert_eq!(inverse_spec.related_table_id, "books");
    }

    #[test]
    fn drop_table_strips_dangling_links() {
        let mut schema = two_tables();
        schema
            .create_link(LinkRequest {
                source_table_id: "books".to_owned(),
                target_table_id: "authors".to_owned(),
                title: "Authors".to_owned(),
                kind: LinkKind::ManyToMany,
                bidirectional: false,
                inverse_title: None,
            })
            .expect("create link");
        schema.drop_table("authors").expect("drop");
        let books = schema.table("books").expect("books");
        assert!(books.link_columns().next().is_none());
    }

    #[test]
    fn drop_column_removes_symmetric_partner() {
        let mut schema = two_tables();
        let (col_id, inverse_id) = schema
            .create_link(LinkRequest {
                source_table_id: "books".to_owned(),
                target_table_id: "authors".to_owned(),
                title: "Authors".to_owned(),
                kind: LinkKind::HasMany,
                bidirectional: true,
                inverse_title: Some("Book".to_owned()),
            })
            .expect("create link");
        schema.drop_column("books", &col_id).expect("drop");
        let authors = schema.table("authors").expect("authors");
        assert!(
            authors
                .column_by_id(&inverse_id.expect("inverse"))
                .is_none()
        );
    }

    #[test]
    fn import_merge_upserts_by_id() {
        let mut schema = two_tables();
        let mut incoming = Schema::default();
        incoming
            .create_table(TableInit {
                id: Some("books".to_owned()),
                title: "Books v2".to_owned(),
                ..TableInit::default()
            })
            .expect("incoming table");
        let exported = incoming.export().expect("export");

        schema.import(exported.clone(), true).expect("merge import");
        assert_eq!(schema.tables.len(), 2);
        assert_eq!(schema.table("books").expect("books").title, "Books v2");

        schema.import(exported, false).expect("replace import");
        assert_eq!(schema.tables.len(), 1);
    }
}
