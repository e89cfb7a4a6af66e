//! Lazy loader: query budget and per-column caching.

use std::sync::Arc;

use gridstore_domain::filter::ListArgs;
use gridstore_store::LazyLoader;
use serde_json::json;

use crate::support::{context, linked_schema, parent_record, record_row};

fn joined_child(parent: &str, id: &str, name: &str) -> serde_json::Value {
    let mut row = record_row(id, json!({"name": name}));
    row["parent_id"] = json!(parent);
    row
}

#[tokio::test]
async fn list_with_relations_uses_one_query_per_relation_column() {
    let (schema, link_id) = linked_schema();
    let (ctx, db) = context(schema);
    let loader = LazyLoader::new(Arc::clone(&ctx), "tasks").expect("loader");

    // Parent list, then one fused edge+child query for the column.
    db.push_rows(vec![
        record_row("a1", json!({"title": "one"})),
        record_row("a2", json!({"title": "two"})),
    ]);
    db.push_rows(vec![
        joined_child("a1", "b1", "first"),
        joined_child("a1", "b2", "second"),
    ]);

    let parents = loader
        .list_with_relations(&ListArgs::default(), &[link_id], None)
        .await
        .expect("list with relations");

    assert_eq!(parents.len(), 2);
    let a1_children = parents[0].get("subtasks").and_then(|v| v.as_array());
    assert_eq!(a1_children.map(Vec::len), Some(2));
    let a2_children = parents[1].get("subtasks").and_then(|v| v.as_array());
    assert_eq!(a2_children.map(Vec::len), Some(0));

    // One parent query plus K=1 relation queries.
    let statements = db.statements();
    assert_eq!(statements.len(), 2, "N+1 collapsed to 1 + K queries");
    assert!(statements[1].sql.contains("JOIN"));
}

#[tokio::test]
async fn repeated_batch_loads_hit_the_cache() {
    let (schema, link_id) = linked_schema();
    let (ctx, db) = context(schema);
    let loader = LazyLoader::new(Arc::clone(&ctx), "tasks").expect("loader");

    db.push_rows(vec![joined_child("a1", "b1", "only")]);
    let parents = vec![parent_record("a1")];

    let first = loader
        .batch_load_related(&parents, &link_id, None)
        .await
        .expect("first load");
    let second = loader
        .batch_load_related(&parents, &link_id, None)
        .await
        .expect("second load");
    assert_eq!(first, second);
    assert_eq!(db.statements().len(), 1, "second load served from cache");

    loader.clear_cache(None);
    db.push_rows(vec![joined_child("a1", "b1", "only")]);
    let _ = loader
        .batch_load_related(&parents, &link_id, None)
        .await
        .expect("reload");
    assert_eq!(db.statements().len(), 2, "cleared cache queries again");
}
