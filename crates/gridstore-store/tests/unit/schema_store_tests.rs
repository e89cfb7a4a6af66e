//! Versioned schema store: patch fail-first persistence and publish.

use std::sync::Arc;

use gridstore_domain::ports::SqlParam;
use gridstore_domain::schema::{PatchOp, SchemaEnv};
use gridstore_store::SchemaStore;
use serde_json::json;

use crate::support::context;

fn schema_row(env: &str, version: i64, schema: serde_json::Value) -> serde_json::Value {
    json!({
        "id": format!("snap_{env}_{version}"),
        "domain": "table",
        "entity_id": "tasks",
        "project_id": "p1",
        "env": env,
        "version": version,
        "schema": schema,
        "created_at": "2026-01-10T12:00:00Z",
        "updated_at": "2026-01-10T12:00:00Z",
    })
}

#[tokio::test]
async fn applied_patches_bump_the_dev_version() {
    let (ctx, db) = context(gridstore_domain::schema::Schema::default());
    let store = SchemaStore::new(Arc::clone(&ctx));

    // Latest DEV for the patch, then latest DEV again inside save_version.
    db.push_rows(vec![schema_row("DEV", 3, json!({"columns": []}))]);
    db.push_rows(vec![schema_row("DEV", 3, json!({"columns": []}))]);

    let outcome = store
        .apply_patch(
            "table",
            "tasks",
            "p1",
            vec![PatchOp::Add {
                path: "/columns/-".to_owned(),
                value: json!({"id": "c", "title": "C", "type": "text"}),
            }],
        )
        .await
        .expect("apply");

    assert_eq!(outcome.applied.len(), 1);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.record.version, 4);
    assert_eq!(outcome.record.schema, json!({"columns": [{"id": "c", "title": "C", "type": "text"}]}));

    let insert = db
        .statements()
        .into_iter()
        .find(|c| c.sql.starts_with("INSERT INTO \"gs_schemas\""))
        .expect("snapshot written");
    assert!(insert.params.contains(&SqlParam::I64(4)));
}

#[tokio::test]
async fn a_failing_first_op_writes_nothing() {
    let (ctx, db) = context(gridstore_domain::schema::Schema::default());
    let store = SchemaStore::new(Arc::clone(&ctx));

    db.push_rows(vec![schema_row("DEV", 3, json!({"columns": []}))]);
    let outcome = store
        .apply_patch(
            "table",
            "tasks",
            "p1",
            vec![
                PatchOp::Test {
                    path: "/columns".to_owned(),
                    value: json!(["not", "the", "value"]),
                },
                PatchOp::Add {
                    path: "/columns/-".to_owned(),
                    value: json!({}),
                },
            ],
        )
        .await
        .expect("apply");

    assert!(outcome.applied.is_empty());
    assert!(outcome.error.is_some());
    assert_eq!(outcome.record.version, 3, "version unchanged");
    assert!(
        !db.statements()
            .iter()
            .any(|c| c.sql.starts_with("INSERT")),
        "nothing persisted"
    );
}

#[tokio::test]
async fn publish_overwrites_pro_with_the_dev_snapshot() {
    let (ctx, db) = context(gridstore_domain::schema::Schema::default());
    let store = SchemaStore::new(Arc::clone(&ctx));

    db.push_rows(vec![schema_row("DEV", 5, json!({"columns": ["c"]}))]);
    let published = store
        .publish("table", "tasks", "p1")
        .await
        .expect("publish");

    assert_eq!(published.env, SchemaEnv::Pro);
    assert_eq!(published.version, 5, "PRO mirrors the DEV version");
    assert_eq!(published.schema, json!({"columns": ["c"]}));

    let markers: Vec<String> = db.calls().iter().map(|c| c.sql.clone()).collect();
    assert_eq!(markers.first().map(String::as_str), Some("BEGIN"));
    assert_eq!(markers.last().map(String::as_str), Some("COMMIT"));

    let delete = db
        .statements()
        .into_iter()
        .find(|c| c.sql.starts_with("DELETE"))
        .expect("old PRO rows cleared");
    assert!(delete.params.contains(&SqlParam::String("PRO".to_owned())));
}

#[tokio::test]
async fn first_snapshot_gets_version_one() {
    let (ctx, db) = context(gridstore_domain::schema::Schema::default());
    let store = SchemaStore::new(Arc::clone(&ctx));

    // No existing snapshot.
    db.push_rows(vec![]);
    let record = store
        .save_version("table", "tasks", "p1", SchemaEnv::Dev, json!({}), None)
        .await
        .expect("save");
    assert_eq!(record.version, 1);
    let _ = db;
}
