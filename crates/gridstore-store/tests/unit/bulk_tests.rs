//! Bulk-write semantics: atomicity, skip-on-missing, chunking.

use std::sync::Arc;

use gridstore_domain::record::{Record, WriteContext};
use gridstore_store::records::BulkOptions;
use gridstore_store::RecordOps;
use serde_json::json;

use crate::support::{context, linked_schema, record_row};

fn task(title: &str) -> Record {
    let mut record = Record::new();
    record.insert("title".to_owned(), json!(title));
    record
}

#[tokio::test]
async fn bulk_insert_commits_the_engine_opened_transaction() {
    let (schema, _) = linked_schema();
    let (ctx, db) = context(schema);
    let ops = RecordOps::new(Arc::clone(&ctx), "tasks").expect("ops");

    // Rehydration batch after the chunked insert.
    db.push_rows(vec![
        record_row("a", json!({"title": "one"})),
        record_row("b", json!({"title": "two"})),
    ]);

    let inserted = ops
        .bulk_insert(
            vec![task("one"), task("two")],
            &BulkOptions::default(),
            None,
            &WriteContext::default(),
        )
        .await
        .expect("bulk insert");
    assert_eq!(inserted.len(), 2);

    let markers: Vec<String> = db.calls().iter().map(|c| c.sql.clone()).collect();
    assert_eq!(markers.first().map(String::as_str), Some("BEGIN"));
    assert_eq!(markers.last().map(String::as_str), Some("COMMIT"));
    assert!(!markers.iter().any(|m| m == "ROLLBACK"));
}

#[tokio::test]
async fn bulk_insert_rolls_back_on_any_chunk_failure() {
    let (schema, _) = linked_schema();
    let (ctx, db) = context(schema);
    let ops = RecordOps::new(Arc::clone(&ctx), "tasks").expect("ops");

    db.fail_next_execute("duplicate key");
    let result = ops
        .bulk_insert(
            vec![task("one"), task("two")],
            &BulkOptions::default(),
            None,
            &WriteContext::default(),
        )
        .await;
    assert!(result.is_err());

    let markers: Vec<String> = db.calls().iter().map(|c| c.sql.clone()).collect();
    assert!(markers.iter().any(|m| m == "ROLLBACK"));
    assert!(!markers.iter().any(|m| m == "COMMIT"));
}

#[tokio::test]
async fn bulk_insert_chunks_by_the_configured_size() {
    let (schema, _) = linked_schema();
    let (ctx, db) = context(schema);
    let ops = RecordOps::new(Arc::clone(&ctx), "tasks").expect("ops");

    db.push_rows(vec![]);
    let _ = ops
        .bulk_insert(
            vec![task("a"), task("b"), task("c")],
            &BulkOptions { chunk_size: 2 },
            None,
            &WriteContext::default(),
        )
        .await
        .expect("bulk insert");

    let inserts: Vec<_> = db
        .statements()
        .into_iter()
        .filter(|c| c.sql.starts_with("INSERT INTO \"gs_records\""))
        .collect();
    assert_eq!(inserts.len(), 2, "3 rows at chunk size 2 is two statements");
    assert_eq!(inserts[0].params.len(), 14, "7 params per row, 2 rows");
    assert_eq!(inserts[1].params.len(), 7);
}

#[tokio::test]
async fn bulk_update_skips_rows_without_ids_and_unknown_ids() {
    let (schema, _) = linked_schema();
    let (ctx, db) = context(schema);
    let ops = RecordOps::new(Arc::clone(&ctx), "tasks").expect("ops");

    let mut with_id = task("known");
    with_id.insert("id".to_owned(), json!("rec_1"));
    let mut unknown = task("ghost");
    unknown.insert("id".to_owned(), json!("rec_404"));

    // Pre-read for rec_1 finds a blob; the pre-read for rec_404 finds
    // nothing; the final batch rehydrates the single written row.
    db.push_rows(vec![record_row("rec_1", json!({"title": "old"}))]);
    db.push_rows(vec![]);
    db.push_rows(vec![record_row("rec_1", json!({"title": "known"}))]);

    let updated = ops
        .bulk_update(
            vec![task("no id"), with_id, unknown],
            &BulkOptions::default(),
            None,
            &WriteContext::default(),
        )
        .await
        .expect("bulk update");
    assert_eq!(updated.len(), 1);

    let updates: Vec<_> = db
        .statements()
        .into_iter()
        .filter(|c| c.sql.starts_with("UPDATE"))
        .collect();
    assert_eq!(updates.len(), 1, "only the known row is written");
}

#[tokio::test]
async fn bulk_update_all_merges_one_patch_over_matches() {
    let (schema, _) = linked_schema();
    let (ctx, db) = context(schema);
    let ops = RecordOps::new(Arc::clone(&ctx), "tasks").expect("ops");

    // The id-resolving scan.
    db.push_rows(vec![
        serde_json::json!({"id": "a"}),
        serde_json::json!({"id": "b"}),
    ]);
    db.push_affected(2);

    let count = ops
        .bulk_update_all(
            &gridstore_domain::filter::ListArgs::default(),
            task("patched"),
            None,
            &WriteContext::default(),
        )
        .await
        .expect("update all");
    assert_eq!(count, 2);

    let update = db
        .statements()
        .into_iter()
        .find(|c| c.sql.starts_with("UPDATE"))
        .expect("one UPDATE");
    assert!(update.sql.contains("\"data\" = \"data\" || ?"));
    assert!(update.sql.contains("= ANY(?)"));
}
