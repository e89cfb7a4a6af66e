//! Many-to-many link operations.
//!
//! Edges live in the links table; linking is idempotent through the unique
//! key over (link column, source, target). Listing joins the target table
//! against the edge set; the excluded list is its complement.

use std::sync::Arc;

use gridstore_domain::constants::{LINKS_TABLE, links, records};
use gridstore_domain::error::{Error, Result};
use gridstore_domain::filter::ListArgs;
use gridstore_domain::ids;
use gridstore_domain::ports::{SqlParam, Transaction};
use gridstore_domain::record::Record;
use gridstore_domain::schema::{Column, LinkKind, LinkSpec, Table};
use gridstore_query::SqlExpr;
use tracing::debug;

use crate::context::StoreContext;
use crate::records::RecordOps;

/// Link operations over one table's link columns.
pub struct LinkOps {
    ctx: Arc<StoreContext>,
    table_id: String,
}

impl LinkOps {
    /// Operations handle for `table_id`; fails when the table is unknown.
    pub fn new(ctx: Arc<StoreContext>, table_id: &str) -> Result<Self> {
        ctx.table(table_id)?;
        Ok(Self {
            ctx,
            table_id: table_id.to_owned(),
        })
    }

    /// Resolve a many-to-many link column on this table.
    fn mm_column(&self, column_key: &str) -> Result<(&Column, &LinkSpec)> {
        let table = self.ctx.table(&self.table_id)?;
        let column = table
            .column(column_key)
            .ok_or_else(|| Error::not_found(format!("link column {column_key}")))?;
        let spec = column
            .kind
            .link_spec()
            .ok_or_else(|| Error::bad_request(format!("column {column_key} is not a link column")))?;
        if spec.kind != LinkKind::ManyToMany {
            return Err(Error::bad_request(format!(
                "column {column_key} is not many-to-many"
            )));
        }
        Ok((column, spec))
    }

    fn related_ops(&self, spec: &LinkSpec) -> Result<RecordOps> {
        RecordOps::new(Arc::clone(&self.ctx), &spec.related_table_id)
    }

    /// Membership predicate over the target table's rows: linked (or not)
    /// from `parent_id` through `column_id`.
    fn edge_predicate(column_id: &str, parent_id: &str, negated: bool) -> SqlExpr {
        let negate = if negated { "NOT " } else { "" };
        SqlExpr::bind(
            format!(
                "{negate}\"base\".\"{id}\" IN (SELECT \"lk\".\"{target}\" \
                 FROM \"{LINKS_TABLE}\" \"lk\" \
                 WHERE \"lk\".\"{field}\" = ? AND \"lk\".\"{source}\" = ?)",
                id = records::ID,
                target = links::TARGET_RECORD_ID,
                field = links::LINK_FIELD_ID,
                source = links::SOURCE_RECORD_ID,
            ),
            vec![SqlParam::string(column_id), SqlParam::string(parent_id)],
        )
    }

    /// List target-table records linked from `parent_id`.
    pub async fn mm_list(
        &self,
        column_key: &str,
        parent_id: &str,
        args: &ListArgs,
        tx: Option<&dyn Transaction>,
    ) -> Result<Vec<Record>> {
        let (column, spec) = self.mm_column(column_key)?;
        let predicate = Self::edge_predicate(&column.id, parent_id, false);
        self.related_ops(spec)?
            .list_with_predicate(args, predicate, tx)
            .await
    }

    /// Count of [`Self::mm_list`].
    pub async fn mm_list_count(
        &self,
        column_key: &str,
        parent_id: &str,
        tx: Option<&dyn Transaction>,
    ) -> Result<u64> {
        let (column, spec) = self.mm_column(column_key)?;
        let predicate = Self::edge_predicate(&column.id, parent_id, false);
        self.related_ops(spec)?
            .count_with_predicate(&ListArgs::default(), predicate, tx)
            .await
    }

    /// List target-table records *not* linked from `parent_id`.
    pub async fn mm_excluded_list(
        &self,
        column_key: &str,
        parent_id: &str,
        args: &ListArgs,
        tx: Option<&dyn Transaction>,
    ) -> Result<Vec<Record>> {
        let (column, spec) = self.mm_column(column_key)?;
        let predicate = Self::edge_predicate(&column.id, parent_id, true);
        self.related_ops(spec)?
            .list_with_predicate(args, predicate, tx)
            .await
    }

    /// Count of [`Self::mm_excluded_list`].
    pub async fn mm_excluded_list_count(
        &self,
        column_key: &str,
        parent_id: &str,
        tx: Option<&dyn Transaction>,
    ) -> Result<u64> {
        let (column, spec) = self.mm_column(column_key)?;
        let predicate = Self::edge_predicate(&column.id, parent_id, true);
        self.related_ops(spec)?
            .count_with_predicate(&ListArgs::default(), predicate, tx)
            .await
    }

    /// Locate the symmetric partner for an edge: the declared id, or a
    /// best-effort scan of the related table for the inverse link column.
    /// An edge without a partner is still valid.
    fn symmetric_column_id(&self, column: &Column, spec: &LinkSpec) -> Option<String> {
        if let Some(declared) = &spec.symmetric_column_id {
            return Some(declared.clone());
        }
        let related: &Table = self.ctx.table(&spec.related_table_id).ok()?;
        related
            .link_columns()
            .find(|(candidate, candidate_spec)| {
                candidate.id != column.id
                    && candidate_spec.related_table_id == self.table_id
                    && candidate_spec
                        .symmetric_column_id
                        .as_deref()
                        .is_none_or(|id| id == column.id)
            })
            .map(|(candidate, _)| candidate.id.clone())
    }

    /// Idempotently link `child_ids` under `parent_id`. Existing edges are
    /// untouched; returns the number of edges actually inserted.
    pub async fn mm_link(
        &self,
        column_key: &str,
        child_ids: &[String],
        parent_id: &str,
        tx: Option<&dyn Transaction>,
    ) -> Result<u64> {
        if child_ids.is_empty() {
            return Ok(0);
        }
        let (column, spec) = self.mm_column(column_key)?;
        let inverse = self.symmetric_column_id(column, spec);
        let now = crate::shred::now();

        let placeholders = vec!["(?, ?, ?, ?, ?, ?)"; child_ids.len()].join(", ");
        let sql = format!(
            "INSERT INTO \"{LINKS_TABLE}\" \
             (\"{id}\", \"{source}\", \"{target}\", \"{field}\", \"{inverse}\", \"{created}\") \
             VALUES {placeholders} \
             ON CONFLICT (\"{field}\", \"{source}\", \"{target}\") DO NOTHING",
            id = links::ID,
            source = links::SOURCE_RECORD_ID,
            target = links::TARGET_RECORD_ID,
            field = links::LINK_FIELD_ID,
            inverse = links::INVERSE_FIELD_ID,
            created = links::CREATED_AT,
        );
        let mut params = Vec::with_capacity(child_ids.len() * 6);
        for child_id in child_ids {
            params.push(SqlParam::string(ids::generate()));
            params.push(SqlParam::string(parent_id));
            params.push(SqlParam::string(child_id));
            params.push(SqlParam::string(&column.id));
            params.push(SqlParam::opt_string(inverse.clone()));
            params.push(SqlParam::Timestamp(now));
        }
        let inserted = self.ctx.exec(tx).execute(&sql, &params).await?;
        debug!(
            column = %column.id,
            parent = %ids::mask(parent_id),
            inserted,
            "linked records"
        );
        Ok(inserted)
    }

    /// Remove the edges for `child_ids` under `parent_id`; returns the
    /// number of edges deleted.
    pub async fn mm_unlink(
        &self,
        column_key: &str,
        child_ids: &[String],
        parent_id: &str,
        tx: Option<&dyn Transaction>,
    ) -> Result<u64> {
        if child_ids.is_empty() {
            return Ok(0);
        }
        let (column, _) = self.mm_column(column_key)?;
        let sql = format!(
            "DELETE FROM \"{LINKS_TABLE}\" \
             WHERE \"{field}\" = ? AND \"{source}\" = ? AND \"{target}\" = ANY(?)",
            field = links::LINK_FIELD_ID,
            source = links::SOURCE_RECORD_ID,
            target = links::TARGET_RECORD_ID,
        );
        let params = [
            SqlParam::string(&column.id),
            SqlParam::string(parent_id),
            SqlParam::StringArray(child_ids.to_vec()),
        ];
        self.ctx.exec(tx).execute(&sql, &params).await
    }

    /// Whether an edge exists between `parent_id` and `child_id`.
    pub async fn has_child(
        &self,
        column_key: &str,
        parent_id: &str,
        child_id: &str,
        tx: Option<&dyn Transaction>,
    ) -> Result<bool> {
        let (column, _) = self.mm_column(column_key)?;
        let sql = format!(
            "SELECT 1 AS \"one\" FROM \"{LINKS_TABLE}\" \
             WHERE \"{field}\" = ? AND \"{source}\" = ? AND \"{target}\" = ? LIMIT 1",
            field = links::LINK_FIELD_ID,
            source = links::SOURCE_RECORD_ID,
            target = links::TARGET_RECORD_ID,
        );
        let params = [
            SqlParam::string(&column.id),
            SqlParam::string(parent_id),
            SqlParam::string(child_id),
        ];
        Ok(self.ctx.exec(tx).query_one(&sql, &params).await?.is_some())
    }
}
