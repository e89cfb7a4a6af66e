//! Copy semantics: cycle tolerance, depth cutoff, transactional bracket.

use std::sync::Arc;

use gridstore_domain::ports::SqlParam;
use gridstore_domain::record::WriteContext;
use gridstore_store::{CopyOps, CopyOptions};
use serde_json::json;

use crate::support::{context, cyclic_schema, edge_target, record_row};

fn param_str(param: &SqlParam) -> String {
    match param {
        SqlParam::String(s) => s.clone(),
        other => panic!("expected string param, got {other:?}"),
    }
}

#[tokio::test]
async fn deep_copy_terminates_on_cycles_and_reuses_clones() {
    let (schema, _link_id) = cyclic_schema();
    let (ctx, db) = context(schema);
    let copier = CopyOps::new(Arc::clone(&ctx));

    // d1 -> d2 -> d3 -> d1. Batches follow the traversal: read source,
    // read-after-insert, edge scan, for each node; the revisit of d1 is
    // answered from the session's visited map with no query.
    db.push_rows(vec![record_row("d1", json!({"name": "one"}))]);
    db.push_rows(vec![record_row("n1", json!({"name": "one"}))]);
    db.push_rows(vec![edge_target("d2")]);
    db.push_rows(vec![record_row("d2", json!({"name": "two"}))]);
    db.push_rows(vec![record_row("n2", json!({"name": "two"}))]);
    db.push_rows(vec![edge_target("d3")]);
    db.push_rows(vec![record_row("d3", json!({"name": "three"}))]);
    db.push_rows(vec![record_row("n3", json!({"name": "three"}))]);
    db.push_rows(vec![edge_target("d1")]);
    db.push_rows(vec![record_row("n1", json!({"name": "one"}))]);

    let copied = copier
        .deep_copy("docs", "d1", &CopyOptions::default(), &WriteContext::default())
        .await
        .expect("deep copy");
    assert!(copied.contains_key("id"));

    let record_inserts: Vec<_> = db
        .statements()
        .into_iter()
        .filter(|c| c.sql.starts_with("INSERT INTO \"gs_records\""))
        .collect();
    assert_eq!(record_inserts.len(), 3, "one clone per reachable source");

    let clone_ids: Vec<String> = record_inserts
        .iter()
        .map(|c| param_str(&c.params[0]))
        .collect();
    let unique: std::collections::HashSet<&String> = clone_ids.iter().collect();
    assert_eq!(unique.len(), 3);
    assert!(!clone_ids.iter().any(|id| ["d1", "d2", "d3"].contains(&id.as_str())));

    // The deepest link insert closes the cycle back onto d1's clone
    // instead of cloning d1 twice.
    let link_inserts: Vec<_> = db
        .statements()
        .into_iter()
        .filter(|c| c.sql.starts_with("INSERT INTO \"gs_links\""))
        .collect();
    assert_eq!(link_inserts.len(), 3);
    let cycle_edge_target = param_str(&link_inserts[0].params[2]);
    assert_eq!(cycle_edge_target, clone_ids[0], "revisit reuses the first clone");

    let markers: Vec<String> = db.calls().iter().map(|c| c.sql.clone()).collect();
    assert_eq!(markers.first().map(String::as_str), Some("BEGIN"));
    assert_eq!(markers.last().map(String::as_str), Some("COMMIT"));
}

#[tokio::test]
async fn depth_cutoff_links_the_original_child_shallowly() {
    let (schema, _link_id) = cyclic_schema();
    let (ctx, db) = context(schema);
    let copier = CopyOps::new(Arc::clone(&ctx));

    // d1 -> d2 -> d3 with max_depth 1: d1 and d2 are cloned, d2's clone
    // keeps a shallow link to the original d3.
    db.push_rows(vec![record_row("d1", json!({"name": "one"}))]);
    db.push_rows(vec![record_row("n1", json!({"name": "one"}))]);
    db.push_rows(vec![edge_target("d2")]);
    db.push_rows(vec![record_row("d2", json!({"name": "two"}))]);
    db.push_rows(vec![record_row("n2", json!({"name": "two"}))]);
    db.push_rows(vec![edge_target("d3")]);
    db.push_rows(vec![record_row("n1", json!({"name": "one"}))]);

    let opts = CopyOptions {
        max_depth: 1,
        ..CopyOptions::default()
    };
    let _ = copier
        .deep_copy("docs", "d1", &opts, &WriteContext::default())
        .await
        .expect("deep copy");

    let record_inserts = db
        .statements()
        .into_iter()
        .filter(|c| c.sql.starts_with("INSERT INTO \"gs_records\""))
        .count();
    assert_eq!(record_inserts, 2, "recursion stops at the depth bound");

    let link_inserts: Vec<_> = db
        .statements()
        .into_iter()
        .filter(|c| c.sql.starts_with("INSERT INTO \"gs_links\""))
        .collect();
    assert_eq!(link_inserts.len(), 2);
    // d2's clone points at the original d3.
    assert_eq!(param_str(&link_inserts[0].params[2]), "d3");
}

#[tokio::test]
async fn backend_failure_rolls_the_whole_copy_back() {
    let (schema, _link_id) = cyclic_schema();
    let (ctx, db) = context(schema);
    let copier = CopyOps::new(Arc::clone(&ctx));

    db.push_rows(vec![record_row("d1", json!({"name": "one"}))]);
    db.fail_next_execute("disk full");

    let result = copier
        .deep_copy("docs", "d1", &CopyOptions::default(), &WriteContext::default())
        .await;
    assert!(result.is_err());

    let markers: Vec<String> = db.calls().iter().map(|c| c.sql.clone()).collect();
    assert!(markers.iter().any(|m| m == "ROLLBACK"));
    assert!(!markers.iter().any(|m| m == "COMMIT"));
}
