//! Shared fixtures for the store unit tests.

use std::sync::Arc;

use gridstore_domain::record::Record;
use gridstore_domain::schema::model::{ColumnInit, LinkRequest, TableInit};
use gridstore_domain::schema::{ColumnKind, LinkKind, Schema};
use gridstore_store::StoreContext;
use gridstore_store::executor::MockDatabase;
use serde_json::{Value, json};

/// Two tables, `tasks` and `subtasks`, with a unidirectional MM link
/// column on `tasks`. Returns the schema and the link column id.
pub fn linked_schema() -> (Schema, String) {
    let mut schema = Schema::default();
    schema
        .create_table(TableInit {
            title: "Tasks".to_owned(),
            columns: vec![
                ColumnInit::new("Title", ColumnKind::Text),
                ColumnInit::new("Priority", ColumnKind::Number),
                ColumnInit::new("Done", ColumnKind::Checkbox),
            ],
            ..TableInit::default()
        })
        .expect("create tasks");
    schema
        .create_table(TableInit {
            title: "Subtasks".to_owned(),
            columns: vec![ColumnInit::new("Name", ColumnKind::Text)],
            ..TableInit::default()
        })
        .expect("create subtasks");
    let (link_id, _) = schema
        .create_link(LinkRequest {
            source_table_id: "tasks".to_owned(),
            target_table_id: "subtasks".to_owned(),
            title: "Subtasks".to_owned(),
            kind: LinkKind::ManyToMany,
            bidirectional: false,
            inverse_title: None,
        })
        .expect("create link");
    (schema, link_id)
}

/// One self-referencing table `docs` with an MM `Children` column.
pub fn cyclic_schema() -> (Schema, String) {
    let mut schema = Schema::default();
    schema
        .create_table(TableInit {
            title: "Docs".to_owned(),
            columns: vec![ColumnInit::new("Name", ColumnKind::Text)],
            ..TableInit::default()
        })
        .expect("create docs");
    let (link_id, _) = schema
        .create_link(LinkRequest {
            source_table_id: "docs".to_owned(),
            target_table_id: "docs".to_owned(),
            title: "Children".to_owned(),
            kind: LinkKind::ManyToMany,
            bidirectional: false,
            inverse_title: None,
        })
        .expect("create link");
    (schema, link_id)
}

/// A context over the given schema and a fresh mock database.
pub fn context(schema: Schema) -> (Arc<StoreContext>, MockDatabase) {
    let db = MockDatabase::new();
    let ctx = StoreContext::new(Arc::new(schema), Arc::new(db.clone()));
    (Arc::new(ctx), db)
}

/// A full physical row for the records table, as the mock serves it.
pub fn record_row(id: &str, data: Value) -> Value {
    json!({
        "id": id,
        "table_id": "ignored-by-deshred",
        "data": data,
        "created_at": "2026-01-10T12:00:00Z",
        "updated_at": "2026-01-10T12:00:00Z",
        "created_by": null,
        "updated_by": null,
    })
}

/// An edge row projection `{target_record_id}`.
pub fn edge_target(target: &str) -> Value {
    json!({ "target_record_id": target })
}

/// A logical record carrying only an id, for loader parents.
pub fn parent_record(id: &str) -> Record {
    let mut record = Record::new();
    record.insert("id".to_owned(), Value::String(id.to_owned()));
    record
}
