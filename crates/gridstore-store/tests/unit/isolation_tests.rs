//! Data isolation: every statement the record layer builds is scoped by
//! the owning table's id.

use std::sync::Arc;

use gridstore_domain::filter::{ComparisonOp, FilterNode, ListArgs};
use gridstore_domain::ports::SqlParam;
use gridstore_domain::record::WriteContext;
use gridstore_store::RecordOps;
use serde_json::json;

use crate::support::{context, linked_schema, record_row};

#[tokio::test]
async fn every_record_statement_carries_the_table_predicate() {
    let (schema, _) = linked_schema();
    let (ctx, db) = context(schema);
    let ops = RecordOps::new(Arc::clone(&ctx), "tasks").expect("ops");

    let args = ListArgs {
        filters: vec![FilterNode::leaf("priority", ComparisonOp::Gte, json!(3))],
        ..ListArgs::default()
    };
    let _ = ops.list(&args, false, None).await.expect("list");
    let _ = ops.count(&args, false, None).await.expect("count");
    let _ = ops.read_by_pk("rec_1", None, None).await.expect("read");
    let _ = ops.exists("rec_1", None).await.expect("exists");
    let _ = ops.delete_by_pk("rec_1", None).await.err();

    let calls = db.statements();
    assert!(!calls.is_empty());
    for call in &calls {
        assert!(
            call.sql.contains("\"table_id\" = ?"),
            "statement without isolation predicate: {}",
            call.sql
        );
        assert!(
            call.params
                .contains(&SqlParam::String("tasks".to_owned())),
            "statement without the table id bound: {}",
            call.sql
        );
    }
}

#[tokio::test]
async fn updates_are_scoped_even_when_the_row_exists() {
    let (schema, _) = linked_schema();
    let (ctx, db) = context(schema);
    let ops = RecordOps::new(Arc::clone(&ctx), "tasks").expect("ops");

    // Blob pre-read, then the rewrite, then the rehydrating read.
    db.push_rows(vec![record_row("rec_1", json!({"title": "old"}))]);
    db.push_rows(vec![record_row("rec_1", json!({"title": "new"}))]);

    let mut patch = gridstore_domain::record::Record::new();
    patch.insert("title".to_owned(), json!("new"));
    let _ = ops
        .update_by_pk("rec_1", patch, None, &WriteContext::default())
        .await
        .expect("update");

    let update = db
        .statements()
        .into_iter()
        .find(|call| call.sql.starts_with("UPDATE"))
        .expect("an UPDATE was issued");
    assert!(update.sql.contains("\"table_id\" = ?"));
}
