//! Link operations: idempotent linking, edge-scoped listing, exclusion.

use std::sync::Arc;

use gridstore_domain::filter::ListArgs;
use gridstore_domain::ports::SqlParam;
use gridstore_store::LinkOps;
use serde_json::json;

use crate::support::{context, linked_schema, record_row};

#[tokio::test]
async fn linking_twice_is_observably_a_no_op() {
    let (schema, link_id) = linked_schema();
    let (ctx, db) = context(schema);
    let ops = LinkOps::new(Arc::clone(&ctx), "tasks").expect("ops");

    db.push_affected(1);
    db.push_affected(0);

    let first = ops
        .mm_link(&link_id, &["b1".to_owned()], "a1", None)
        .await
        .expect("first link");
    let second = ops
        .mm_link(&link_id, &["b1".to_owned()], "a1", None)
        .await
        .expect("second link");
    assert_eq!(first, 1);
    assert_eq!(second, 0, "the duplicate edge is swallowed by the unique key");

    for call in db.statements() {
        assert!(
            call.sql.contains("ON CONFLICT")
                && call.sql.contains("DO NOTHING"),
            "link insert is not conflict-tolerant: {}",
            call.sql
        );
    }
}

#[tokio::test]
async fn mm_list_queries_the_target_table_through_the_edge_set() {
    let (schema, link_id) = linked_schema();
    let (ctx, db) = context(schema);
    let ops = LinkOps::new(Arc::clone(&ctx), "tasks").expect("ops");

    db.push_rows(vec![record_row("b1", json!({"name": "child"}))]);
    let children = ops
        .mm_list(&link_id, "a1", &ListArgs::default(), None)
        .await
        .expect("mm list");
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].get("name"), Some(&json!("child")));

    let call = &db.statements()[0];
    // Scoped to the related table, membership via the links table.
    assert!(call.sql.contains("\"table_id\" = ?"));
    assert!(call.sql.contains("\"gs_links\""));
    assert!(call.params.contains(&SqlParam::String("subtasks".to_owned())));
    assert!(call.params.contains(&SqlParam::String(link_id.clone())));
    assert!(call.params.contains(&SqlParam::String("a1".to_owned())));
}

#[tokio::test]
async fn excluded_list_negates_the_membership_predicate() {
    let (schema, link_id) = linked_schema();
    let (ctx, db) = context(schema);
    let ops = LinkOps::new(Arc::clone(&ctx), "tasks").expect("ops");

    db.push_rows(vec![record_row("b2", json!({"name": "other"}))]);
    let excluded = ops
        .mm_excluded_list(&link_id, "a1", &ListArgs::default(), None)
        .await
        .expect("excluded list");
    assert_eq!(excluded.len(), 1);

    let call = &db.statements()[0];
    assert!(call.sql.contains("NOT \"base\".\"id\" IN"));
}

#[tokio::test]
async fn unlink_deletes_exactly_the_named_edges() {
    let (schema, link_id) = linked_schema();
    let (ctx, db) = context(schema);
    let ops = LinkOps::new(Arc::clone(&ctx), "tasks").expect("ops");

    db.push_affected(2);
    let removed = ops
        .mm_unlink(
            &link_id,
            &["b1".to_owned(), "b2".to_owned()],
            "a1",
            None,
        )
        .await
        .expect("unlink");
    assert_eq!(removed, 2);

    let call = &db.statements()[0];
    assert!(call.sql.starts_with("DELETE FROM \"gs_links\""));
    assert!(call.sql.contains("= ANY(?)"));
    assert_eq!(
        call.params[2],
        SqlParam::StringArray(vec!["b1".to_owned(), "b2".to_owned()])
    );
}

#[tokio::test]
async fn has_child_is_a_bounded_existence_probe() {
    let (schema, link_id) = linked_schema();
    let (ctx, db) = context(schema);
    let ops = LinkOps::new(Arc::clone(&ctx), "tasks").expect("ops");

    let exists = ops
        .has_child(&link_id, "a1", "b1", None)
        .await
        .expect("probe");
    assert!(!exists, "no canned row means no edge");
    assert!(db.statements()[0].sql.ends_with("LIMIT 1"));
}
