//! Record copy operations.
//!
//! Shallow copies duplicate one record and re-link its existing children;
//! deep copies clone reachable children too, bounded by `max_depth`. The
//! traversal keeps a visited map from source id to clone id, so cycles
//! terminate and diamond shapes clone each node once. All variants run in
//! one transaction, supplied or engine-opened, and roll back on error.

use std::collections::HashMap;
use std::sync::Arc;

use gridstore_domain::constants::{LINKS_TABLE, links, records};
use gridstore_domain::error::{Error, Result};
use gridstore_domain::ids;
use gridstore_domain::ports::{SqlParam, Transaction};
use gridstore_domain::record::{Record, WriteContext};
use gridstore_domain::schema::LinkKind;
use serde_json::Value;
use tracing::{debug, warn};

use futures::future::BoxFuture;

use crate::context::StoreContext;
use crate::links::LinkOps;
use crate::records::{BulkOptions, RecordOps};

/// Options shared by the copy variants.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Extra fields stripped from the duplicate, on top of the system set.
    pub exclude_fields: Vec<String>,
    /// Whether to copy relations at all.
    pub copy_relations: bool,
    /// Deep mode: clone reachable children instead of re-linking them.
    pub deep: bool,
    /// Relation recursion bound for deep mode. Past it, the clone gets a
    /// shallow link to the original child.
    pub max_depth: usize,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            exclude_fields: Vec::new(),
            copy_relations: true,
            deep: false,
            max_depth: 3,
        }
    }
}

/// Clone-tracking for one copy session.
#[derive(Debug, Default)]
struct CopySession {
    /// Source id → clone id for every node copied so far.
    visited: HashMap<String, String>,
}

/// Copy operations over the schema snapshot.
pub struct CopyOps {
    ctx: Arc<StoreContext>,
}

impl CopyOps {
    /// Copy operations bound to a context.
    pub fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }

    fn records_ops(&self, table_id: &str) -> Result<RecordOps> {
        RecordOps::new(Arc::clone(&self.ctx), table_id)
    }

    /// Duplicate one record. With `copy_relations`, children are re-linked
    /// (shallow) or cloned (deep, bounded by `max_depth`).
    pub async fn copy_record(
        &self,
        table_id: &str,
        id: &str,
        opts: &CopyOptions,
        tx: Option<&dyn Transaction>,
        wctx: &WriteContext,
    ) -> Result<Record> {
        match tx {
            Some(tx) => self.copy_in_tx(table_id, id, opts, tx, wctx).await,
            None => {
                let own = self.ctx.db.begin().await?;
                let result = self
                    .copy_in_tx(table_id, id, opts, own.as_ref(), wctx)
                    .await;
                match result {
                    Ok(record) => {
                        own.commit().await?;
                        Ok(record)
                    }
                    Err(err) => {
                        let _ = own.rollback().await;
                        Err(err)
                    }
                }
            }
        }
    }

    /// Transactional recursive clone: [`Self::copy_record`] with deep mode
    /// forced on.
    pub async fn deep_copy(
        &self,
        table_id: &str,
        id: &str,
        opts: &CopyOptions,
        wctx: &WriteContext,
    ) -> Result<Record> {
        let opts = CopyOptions {
            deep: true,
            copy_relations: true,
            ..opts.clone()
        };
        self.copy_record(table_id, id, &opts, None, wctx).await
    }

    async fn copy_in_tx(
        &self,
        table_id: &str,
        id: &str,
        opts: &CopyOptions,
        tx: &dyn Transaction,
        wctx: &WriteContext,
    ) -> Result<Record> {
        let mut session = CopySession::default();
        let new_id = self
            .copy_node(table_id, id, opts, &mut session, 0, tx, wctx)
            .await?;
        self.records_ops(table_id)?
            .read_by_pk(&new_id, None, Some(tx))
            .await?
            .ok_or_else(|| Error::internal("copied record vanished before rehydration"))
    }

    /// Copy one node, returning its clone id. A revisited source returns
    /// the cached clone instead of re-cloning. Boxed because the traversal
    /// recurses through the relation walk.
    #[allow(clippy::too_many_arguments)]
    fn copy_node<'a>(
        &'a self,
        table_id: &'a str,
        id: &'a str,
        opts: &'a CopyOptions,
        session: &'a mut CopySession,
        depth: usize,
        tx: &'a dyn Transaction,
        wctx: &'a WriteContext,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            if let Some(clone_id) = session.visited.get(id) {
                return Ok(clone_id.clone());
            }

            let ops = self.records_ops(table_id)?;
            let source = ops
                .read_by_pk(id, None, Some(tx))
                .await?
                .ok_or_else(|| Error::not_found(format!("record {id}")))?;

            let new_id = ids::generate();
            let mut duplicate = Record::new();
            for (key, value) in source {
                let is_system = matches!(
                    key.as_str(),
                    records::ID
                        | records::TABLE_ID
                        | records::CREATED_AT
                        | records::UPDATED_AT
                        | records::CREATED_BY
                        | records::UPDATED_BY
                );
                if is_system || opts.exclude_fields.contains(&key) {
                    continue;
                }
                duplicate.insert(key, value);
            }
            duplicate.insert(records::ID.to_owned(), Value::String(new_id.clone()));

            // Mark before descending into relations: a cycle re-entering
            // this node short-circuits to the clone id.
            session.visited.insert(id.to_owned(), new_id.clone());
            ops.insert(duplicate, Some(tx), wctx).await?;
            debug!(
                table = %table_id,
                source = %ids::mask(id),
                clone = %ids::mask(&new_id),
                depth,
                "copied record"
            );

            if opts.copy_relations {
                self.copy_relations(table_id, id, &new_id, opts, session, depth, tx, wctx)
                    .await?;
            }
            Ok(new_id)
        })
    }

    /// Clone or re-link the MM relations of one copied record. A failure
    /// on one column is logged and skipped; the primary copy stands.
    #[allow(clippy::too_many_arguments)]
    async fn copy_relations(
        &self,
        table_id: &str,
        source_id: &str,
        target_id: &str,
        opts: &CopyOptions,
        session: &mut CopySession,
        depth: usize,
        tx: &dyn Transaction,
        wctx: &WriteContext,
    ) -> Result<()> {
        let link_columns: Vec<(String, String, LinkKind)> = self
            .ctx
            .table(table_id)?
            .link_columns()
            .map(|(column, spec)| (column.id.clone(), spec.related_table_id.clone(), spec.kind))
            .collect();

        for (column_id, related_table_id, kind) in link_columns {
            if kind != LinkKind::ManyToMany {
                continue;
            }
            let outcome = self
                .copy_column_relations(
                    table_id,
                    &column_id,
                    &related_table_id,
                    source_id,
                    target_id,
                    opts,
                    session,
                    depth,
                    tx,
                    wctx,
                )
                .await;
            if let Err(err) = outcome {
                warn!(
                    column = %column_id,
                    source = %ids::mask(source_id),
                    error = %err,
                    "relation copy failed for column, keeping primary copy"
                );
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn copy_column_relations(
        &self,
        table_id: &str,
        column_id: &str,
        related_table_id: &str,
        source_id: &str,
        target_id: &str,
        opts: &CopyOptions,
        session: &mut CopySession,
        depth: usize,
        tx: &dyn Transaction,
        wctx: &WriteContext,
    ) -> Result<()> {
        let child_ids = self.edge_targets(column_id, source_id, tx).await?;
        if child_ids.is_empty() {
            return Ok(());
        }

        let link_ops = LinkOps::new(Arc::clone(&self.ctx), table_id)?;
        if opts.deep && depth < opts.max_depth {
            let mut clone_ids = Vec::with_capacity(child_ids.len());
            for child_id in &child_ids {
                let clone_id = self
                    .copy_node(related_table_id, child_id, opts, session, depth + 1, tx, wctx)
                    .await?;
                clone_ids.push(clone_id);
            }
            link_ops
                .mm_link(column_id, &clone_ids, target_id, Some(tx))
                .await?;
        } else {
            // Depth cutoff (or shallow mode): the clone points at the
            // original children.
            link_ops
                .mm_link(column_id, &child_ids, target_id, Some(tx))
                .await?;
        }
        Ok(())
    }

    async fn edge_targets(
        &self,
        column_id: &str,
        source_id: &str,
        tx: &dyn Transaction,
    ) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT \"{target}\" FROM \"{LINKS_TABLE}\" \
             WHERE \"{field}\" = ? AND \"{source}\" = ? ORDER BY \"{created_at}\" ASC NULLS LAST",
            target = links::TARGET_RECORD_ID,
            field = links::LINK_FIELD_ID,
            source = links::SOURCE_RECORD_ID,
            created_at = links::CREATED_AT,
        );
        let params = [SqlParam::string(column_id), SqlParam::string(source_id)];
        let rows = self.ctx.exec(Some(tx)).query_all(&sql, &params).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(target) = row.try_get_string(links::TARGET_RECORD_ID)? {
                out.push(target);
            }
        }
        Ok(out)
    }

    /// Bulk-clone every record of `src_table_id` into `tgt_table_id`.
    /// Returns the source→clone id mapping.
    pub async fn copy_table(
        &self,
        src_table_id: &str,
        tgt_table_id: &str,
        tx: Option<&dyn Transaction>,
        wctx: &WriteContext,
    ) -> Result<HashMap<String, String>> {
        match tx {
            Some(tx) => self.copy_table_in_tx(src_table_id, tgt_table_id, tx, wctx).await,
            None => {
                let own = self.ctx.db.begin().await?;
                let result = self
                    .copy_table_in_tx(src_table_id, tgt_table_id, own.as_ref(), wctx)
                    .await;
                match result {
                    Ok(mapping) => {
                        own.commit().await?;
                        Ok(mapping)
                    }
                    Err(err) => {
                        let _ = own.rollback().await;
                        Err(err)
                    }
                }
            }
        }
    }

    async fn copy_table_in_tx(
        &self,
        src_table_id: &str,
        tgt_table_id: &str,
        tx: &dyn Transaction,
        wctx: &WriteContext,
    ) -> Result<HashMap<String, String>> {
        self.ctx.table(src_table_id)?;
        let target_ops = self.records_ops(tgt_table_id)?;

        let sql = format!(
            "SELECT \"{id}\", \"{data}\" FROM \"{table}\" WHERE \"{table_id}\" = ?",
            id = records::ID,
            data = records::DATA,
            table = gridstore_domain::constants::RECORDS_TABLE,
            table_id = records::TABLE_ID,
        );
        let params = [SqlParam::string(src_table_id)];
        let rows = self.ctx.exec(Some(tx)).query_all(&sql, &params).await?;

        let mut mapping = HashMap::with_capacity(rows.len());
        let mut clones = Vec::with_capacity(rows.len());
        for row in rows {
            let source_id = row
                .try_get_string(records::ID)?
                .ok_or_else(|| Error::internal("records row is missing id"))?;
            let new_id = ids::generate();
            let mut clone = Record::new();
            if let Some(Value::Object(blob)) = row.try_get_json(records::DATA)? {
                for (key, value) in blob {
                    clone.insert(key, value);
                }
            }
            clone.insert(records::ID.to_owned(), Value::String(new_id.clone()));
            mapping.insert(source_id, new_id);
            clones.push(clone);
        }

        target_ops
            .bulk_insert(clones, &BulkOptions::default(), Some(tx), wctx)
            .await?;
        debug!(
            source = %src_table_id,
            target = %tgt_table_id,
            count = mapping.len(),
            "copied table rows"
        );
        Ok(mapping)
    }
}
