//! Record operations: CRUD, list/count, bulk writes, group-by.
//!
//! One `RecordOps` serves one logical table for one request. Reads deshred
//! physical rows back into flat records; writes shred incoming records into
//! the blob plus system columns. Every statement is scoped by `table_id`
//! from the builder up.

use std::collections::HashMap;

use gridstore_domain::constants::{RECORDS_TABLE, records};
use gridstore_domain::error::{Error, Result};
use gridstore_domain::filter::{AggFn, FilterNode, GroupByArgs, ListArgs, PageInfo, SortSpec};
use gridstore_domain::ids;
use gridstore_domain::ports::{DatabaseExecutor, SqlParam, Transaction};
use gridstore_domain::record::{Record, WriteContext};
use gridstore_domain::sanitize;
use gridstore_domain::schema::Table;
use gridstore_query::{SelectBuilder, SqlExpr, condition, legacy, sort};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::StoreContext;
use crate::shred::{self, Shredded};

/// Chunking options for bulk writes.
#[derive(Debug, Clone, Copy)]
pub struct BulkOptions {
    /// Rows per physical statement / per merge batch.
    pub chunk_size: usize,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self { chunk_size: 100 }
    }
}

/// One group-by result row.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    /// The grouped value.
    pub key: Value,
    /// The aggregate over the group.
    pub value: Value,
}

/// Record operations over one logical table.
pub struct RecordOps {
    ctx: Arc<StoreContext>,
    table_id: String,
}

impl RecordOps {
    /// Operations handle for `table_id`; fails when the table is unknown.
    pub fn new(ctx: Arc<StoreContext>, table_id: &str) -> Result<Self> {
        ctx.table(table_id)?;
        Ok(Self {
            ctx,
            table_id: table_id.to_owned(),
        })
    }

    fn table(&self) -> Result<&Table> {
        self.ctx.table(&self.table_id)
    }

    /// Virtual projections as (alias, output key) pairs, skipping columns
    /// whose storage name cannot serve as an alias.
    fn virtual_aliases(&self, table: &Table, fields: Option<&[String]>) -> Vec<(String, String)> {
        if !self.ctx.include_virtual {
            return Vec::new();
        }
        table
            .columns
            .iter()
            .filter(|c| c.kind.is_virtual())
            .filter(|c| {
                fields.is_none_or(|wanted| {
                    wanted
                        .iter()
                        .any(|f| f == &c.id || f == &c.title || f == &c.name)
                })
            })
            .filter_map(|c| match sanitize::ensure_alias(&c.name) {
                Ok(alias) => Some((alias.to_owned(), c.name.clone())),
                Err(_) => {
                    warn!(column = %c.id, "virtual column name is not alias-safe, skipping projection");
                    None
                }
            })
            .collect()
    }

    /// Build the standard SELECT over this table: system fields, the data
    /// blob, virtual projections, filters, sorts.
    fn base_query(
        &self,
        args: &ListArgs,
        ignore_filter_sort: bool,
    ) -> Result<(SelectBuilder, Vec<(String, String)>)> {
        let table = self.table()?;
        let qctx = self.ctx.query_ctx(table);
        let mut builder = SelectBuilder::new(table, &qctx.alias)?;

        for field in [
            records::ID,
            records::DATA,
            records::CREATED_AT,
            records::UPDATED_AT,
            records::CREATED_BY,
            records::UPDATED_BY,
        ] {
            builder.project(SqlExpr::raw(format!("\"{}\".\"{field}\"", qctx.alias)));
        }

        let virtual_aliases = self.virtual_aliases(table, args.fields.as_deref());
        for (alias, _) in &virtual_aliases {
            let column = table
                .column(alias)
                .ok_or_else(|| Error::not_found(format!("column {alias}")))?;
            let expr = qctx.column_expr_or_null(column)?;
            builder.project_as(expr, alias)?;
        }

        if !ignore_filter_sort {
            let mut filters: Vec<FilterNode> = args.filters.clone();
            if let Some(where_str) = &args.where_str {
                if let Some(node) = legacy::parse_where(where_str) {
                    filters.push(node);
                }
            }
            if let Some(predicate) = condition::compile(&qctx, &filters)? {
                builder.and_where(predicate);
            }

            let mut sorts: Vec<SortSpec> = args.sorts.clone();
            if let Some(sort_str) = &args.sort_str {
                sorts.extend(legacy::parse_sort(sort_str));
            }
            for order in sort::compile(&qctx, &sorts)? {
                builder.order_by(order);
            }
        }

        Ok((builder, virtual_aliases))
    }

    /// Read one record by primary key; `None` when absent.
    pub async fn read_by_pk(
        &self,
        id: &str,
        fields: Option<&[String]>,
        tx: Option<&dyn Transaction>,
    ) -> Result<Option<Record>> {
        let table = self.table()?;
        let args = ListArgs {
            fields: fields.map(<[String]>::to_vec),
            ..ListArgs::default()
        };
        let (mut builder, virtual_aliases) = self.base_query(&args, true)?;
        builder.and_where(SqlExpr::bind(
            format!("\"base\".\"{}\" = ?", records::ID),
            vec![SqlParam::string(id)],
        ));
        builder.window(Some(1), None);
        let query = builder.build();
        let row = self.ctx.exec(tx).query_one(&query.sql, &query.params).await?;
        row.map(|row| shred::deshred(table, row.as_ref(), args.fields.as_deref(), &virtual_aliases))
            .transpose()
    }

    /// Cheap existence probe.
    pub async fn exists(&self, id: &str, tx: Option<&dyn Transaction>) -> Result<bool> {
        let sql = format!(
            "SELECT 1 AS \"one\" FROM \"{RECORDS_TABLE}\" \"base\" \
             WHERE \"base\".\"{}\" = ? AND \"base\".\"{}\" = ? LIMIT 1",
            records::TABLE_ID,
            records::ID,
        );
        let params = [SqlParam::string(&self.table_id), SqlParam::string(id)];
        Ok(self.ctx.exec(tx).query_one(&sql, &params).await?.is_some())
    }

    /// Insert one record, server-assigning the id unless supplied, and
    /// return a fresh read of the stored row.
    pub async fn insert(
        &self,
        data: Record,
        tx: Option<&dyn Transaction>,
        wctx: &WriteContext,
    ) -> Result<Record> {
        let table = self.table()?;
        let mut shredded = shred::shred(table, data);
        shred::apply_defaults(table, &mut shredded.data);
        let id = shredded.id.clone().unwrap_or_else(ids::generate);
        debug!(table = %self.table_id, id = %ids::mask(&id), "inserting record");

        self.insert_shredded(&id, &shredded, self.ctx.exec(tx), wctx)
            .await?;
        self.read_by_pk(&id, None, tx)
            .await?
            .ok_or_else(|| Error::internal("inserted record vanished before rehydration"))
    }

    async fn insert_shredded(
        &self,
        id: &str,
        shredded: &Shredded,
        exec: &dyn DatabaseExecutor,
        wctx: &WriteContext,
    ) -> Result<()> {
        let now = shred::now();
        let actor = shredded
            .created_by
            .clone()
            .or_else(|| wctx.user_id.clone());
        let sql = format!(
            "INSERT INTO \"{RECORDS_TABLE}\" \
             (\"{}\", \"{}\", \"{}\", \"{}\", \"{}\", \"{}\", \"{}\") \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            records::ID,
            records::TABLE_ID,
            records::DATA,
            records::CREATED_AT,
            records::UPDATED_AT,
            records::CREATED_BY,
            records::UPDATED_BY,
        );
        let params = [
            SqlParam::string(id),
            SqlParam::string(&self.table_id),
            SqlParam::Json(Value::Object(shredded.data.clone())),
            SqlParam::Timestamp(now),
            SqlParam::Timestamp(now),
            SqlParam::opt_string(actor.clone()),
            SqlParam::opt_string(actor),
        ];
        exec.execute(&sql, &params).await?;
        Ok(())
    }

    /// Merge `data` over the stored record and rewrite the blob plus the
    /// modification system columns.
    pub async fn update_by_pk(
        &self,
        id: &str,
        data: Record,
        tx: Option<&dyn Transaction>,
        wctx: &WriteContext,
    ) -> Result<Record> {
        let table = self.table()?;
        let exec = self.ctx.exec(tx);
        let existing = self
            .read_blob(id, exec)
            .await?
            .ok_or_else(|| Error::not_found(format!("record {id}")))?;

        let shredded = shred::shred(table, data);
        let mut merged = existing;
        for (key, value) in shredded.data.clone() {
            merged.insert(key, value);
        }
        self.write_blob(id, merged, &shredded, exec, wctx).await?;
        self.read_by_pk(id, None, tx)
            .await?
            .ok_or_else(|| Error::not_found(format!("record {id}")))
    }

    async fn read_blob(
        &self,
        id: &str,
        exec: &dyn DatabaseExecutor,
    ) -> Result<Option<Map<String, Value>>> {
        let sql = format!(
            "SELECT \"{data}\" FROM \"{RECORDS_TABLE}\" \
             WHERE \"{id_col}\" = ? AND \"{table_id}\" = ? LIMIT 1",
            data = records::DATA,
            id_col = records::ID,
            table_id = records::TABLE_ID,
        );
        let params = [SqlParam::string(id), SqlParam::string(&self.table_id)];
        let Some(row) = exec.query_one(&sql, &params).await? else {
            return Ok(None);
        };
        match row.try_get_json(records::DATA)? {
            Some(Value::Object(map)) => Ok(Some(map)),
            _ => Ok(Some(Map::new())),
        }
    }

    async fn write_blob(
        &self,
        id: &str,
        blob: Map<String, Value>,
        shredded: &Shredded,
        exec: &dyn DatabaseExecutor,
        wctx: &WriteContext,
    ) -> Result<()> {
        let actor = shredded
            .updated_by
            .clone()
            .or_else(|| wctx.user_id.clone());
        let sql = format!(
            "UPDATE \"{RECORDS_TABLE}\" SET \"{data}\" = ?, \"{updated_at}\" = ?, \
             \"{updated_by}\" = ? WHERE \"{id_col}\" = ? AND \"{table_id}\" = ?",
            data = records::DATA,
            updated_at = records::UPDATED_AT,
            updated_by = records::UPDATED_BY,
            id_col = records::ID,
            table_id = records::TABLE_ID,
        );
        let params = [
            SqlParam::Json(Value::Object(blob)),
            SqlParam::Timestamp(shred::now()),
            SqlParam::opt_string(actor),
            SqlParam::string(id),
            SqlParam::string(&self.table_id),
        ];
        exec.execute(&sql, &params).await?;
        Ok(())
    }

    /// Physical delete by primary key; returns the deleted count (1).
    pub async fn delete_by_pk(&self, id: &str, tx: Option<&dyn Transaction>) -> Result<u64> {
        let sql = format!(
            "DELETE FROM \"{RECORDS_TABLE}\" WHERE \"{id_col}\" = ? AND \"{table_id}\" = ?",
            id_col = records::ID,
            table_id = records::TABLE_ID,
        );
        let params = [SqlParam::string(id), SqlParam::string(&self.table_id)];
        let affected = self.ctx.exec(tx).execute(&sql, &params).await?;
        if affected == 0 {
            return Err(Error::not_found(format!("record {id}")));
        }
        debug!(table = %self.table_id, id = %ids::mask(id), "deleted record");
        Ok(affected)
    }

    /// List records under the clamped window.
    pub async fn list(
        &self,
        args: &ListArgs,
        ignore_filter_sort: bool,
        tx: Option<&dyn Transaction>,
    ) -> Result<Vec<Record>> {
        let table = self.table()?;
        let (mut builder, virtual_aliases) = self.base_query(args, ignore_filter_sort)?;
        let limit = self.ctx.limits.clamp(args.limit);
        builder.window(Some(limit), args.offset);
        let query = builder.build();
        let rows = self.ctx.exec(tx).query_all(&query.sql, &query.params).await?;
        rows.iter()
            .map(|row| shred::deshred(table, row.as_ref(), args.fields.as_deref(), &virtual_aliases))
            .collect()
    }

    /// [`Self::list`] with an extra predicate ANDed on; the link layer's
    /// membership filters come through here.
    pub(crate) async fn list_with_predicate(
        &self,
        args: &ListArgs,
        predicate: SqlExpr,
        tx: Option<&dyn Transaction>,
    ) -> Result<Vec<Record>> {
        let table = self.table()?;
        let (mut builder, virtual_aliases) = self.base_query(args, false)?;
        builder.and_where(predicate);
        builder.window(Some(self.ctx.limits.clamp(args.limit)), args.offset);
        let query = builder.build();
        let rows = self.ctx.exec(tx).query_all(&query.sql, &query.params).await?;
        rows.iter()
            .map(|row| shred::deshred(table, row.as_ref(), args.fields.as_deref(), &virtual_aliases))
            .collect()
    }

    /// [`Self::count`] with an extra predicate ANDed on.
    pub(crate) async fn count_with_predicate(
        &self,
        args: &ListArgs,
        predicate: SqlExpr,
        tx: Option<&dyn Transaction>,
    ) -> Result<u64> {
        let (mut builder, _) = self.base_query(args, false)?;
        builder.and_where(predicate);
        let query = builder.build_count();
        let row = self.ctx.exec(tx).query_one(&query.sql, &query.params).await?;
        let count = row
            .and_then(|r| r.try_get_i64("count").ok().flatten())
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    /// List plus the pagination echo for the effective window.
    pub async fn list_paged(
        &self,
        args: &ListArgs,
        tx: Option<&dyn Transaction>,
    ) -> Result<(Vec<Record>, PageInfo)> {
        let limit = self.ctx.limits.clamp(args.limit);
        let offset = args.offset.unwrap_or(0);
        let rows = self.list(args, false, tx).await?;
        let page = PageInfo {
            limit,
            offset,
            is_first: offset == 0,
            is_last: (rows.len() as u64) < limit,
        };
        Ok((rows, page))
    }

    /// Count records under the same predicate stack as [`Self::list`].
    pub async fn count(
        &self,
        args: &ListArgs,
        ignore_filter_sort: bool,
        tx: Option<&dyn Transaction>,
    ) -> Result<u64> {
        let (builder, _) = self.base_query(args, ignore_filter_sort)?;
        let query = builder.build_count();
        let row = self.ctx.exec(tx).query_one(&query.sql, &query.params).await?;
        let count = row
            .and_then(|r| r.try_get_i64("count").ok().flatten())
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    /// First match or `None`.
    pub async fn find_one(
        &self,
        args: &ListArgs,
        tx: Option<&dyn Transaction>,
    ) -> Result<Option<Record>> {
        let bounded = ListArgs {
            limit: Some(1),
            ..args.clone()
        };
        Ok(self.list(&bounded, false, tx).await?.into_iter().next())
    }

    /// [`Self::list_with_predicate`] without a window; batch loaders use
    /// this to fetch complete relation sets.
    pub(crate) async fn list_all_with_predicate(
        &self,
        predicate: SqlExpr,
        tx: Option<&dyn Transaction>,
    ) -> Result<Vec<Record>> {
        let table = self.table()?;
        let (mut builder, virtual_aliases) = self.base_query(&ListArgs::default(), true)?;
        builder.and_where(predicate);
        let query = builder.build();
        let rows = self.ctx.exec(tx).query_all(&query.sql, &query.params).await?;
        rows.iter()
            .map(|row| shred::deshred(table, row.as_ref(), None, &virtual_aliases))
            .collect()
    }

    /// Rehydrate many rows by id, in the order of `ids`.
    pub(crate) async fn read_many(
        &self,
        ids: &[String],
        tx: Option<&dyn Transaction>,
    ) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let table = self.table()?;
        let (mut builder, virtual_aliases) = self.base_query(&ListArgs::default(), true)?;
        builder.and_where(SqlExpr::bind(
            format!("\"base\".\"{}\" = ANY(?)", records::ID),
            vec![SqlParam::StringArray(ids.to_vec())],
        ));
        builder.window(Some(ids.len() as u64), None);
        let query = builder.build();
        let rows = self.ctx.exec(tx).query_all(&query.sql, &query.params).await?;

        let mut by_id: HashMap<String, Record> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let record = shred::deshred(table, row.as_ref(), None, &virtual_aliases)?;
            if let Some(Value::String(id)) = record.get(records::ID) {
                by_id.insert(id.clone(), record);
            }
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Batched atomic insert. Runs in the supplied transaction or one the
    /// engine opens; a failure in any chunk leaves none of the rows behind.
    pub async fn bulk_insert(
        &self,
        rows: Vec<Record>,
        opts: &BulkOptions,
        tx: Option<&dyn Transaction>,
        wctx: &WriteContext,
    ) -> Result<Vec<Record>> {
        match tx {
            Some(tx) => self.bulk_insert_inner(rows, opts, Some(tx), wctx).await,
            None => {
                let own = self.ctx.db.begin().await?;
                let result = self
                    .bulk_insert_inner(rows, opts, Some(own.as_ref()), wctx)
                    .await;
                match result {
                    Ok(records) => {
                        own.commit().await?;
                        Ok(records)
                    }
                    Err(err) => {
                        let _ = own.rollback().await;
                        Err(err)
                    }
                }
            }
        }
    }

    async fn bulk_insert_inner(
        &self,
        rows: Vec<Record>,
        opts: &BulkOptions,
        tx: Option<&dyn Transaction>,
        wctx: &WriteContext,
    ) -> Result<Vec<Record>> {
        let table = self.table()?;
        let exec = self.ctx.exec(tx);
        let chunk_size = opts.chunk_size.max(1);
        let now = shred::now();

        let mut ids = Vec::with_capacity(rows.len());
        let shredded: Vec<(String, Shredded)> = rows
            .into_iter()
            .map(|row| {
                let mut shredded = shred::shred(table, row);
                shred::apply_defaults(table, &mut shredded.data);
                let id = shredded.id.clone().unwrap_or_else(ids::generate);
                ids.push(id.clone());
                (id, shredded)
            })
            .collect();

        for chunk in shredded.chunks(chunk_size) {
            let placeholders = vec!["(?, ?, ?, ?, ?, ?, ?)"; chunk.len()].join(", ");
            let sql = format!(
                "INSERT INTO \"{RECORDS_TABLE}\" \
                 (\"{}\", \"{}\", \"{}\", \"{}\", \"{}\", \"{}\", \"{}\") VALUES {placeholders}",
                records::ID,
                records::TABLE_ID,
                records::DATA,
                records::CREATED_AT,
                records::UPDATED_AT,
                records::CREATED_BY,
                records::UPDATED_BY,
            );
            let mut params = Vec::with_capacity(chunk.len() * 7);
            for (id, shredded) in chunk {
                let actor = shredded
                    .created_by
                    .clone()
                    .or_else(|| wctx.user_id.clone());
                params.push(SqlParam::string(id));
                params.push(SqlParam::string(&self.table_id));
                params.push(SqlParam::Json(Value::Object(shredded.data.clone())));
                params.push(SqlParam::Timestamp(now));
                params.push(SqlParam::Timestamp(now));
                params.push(SqlParam::opt_string(actor.clone()));
                params.push(SqlParam::opt_string(actor));
            }
            exec.execute(&sql, &params).await?;
        }

        debug!(table = %self.table_id, count = ids.len(), "bulk inserted records");
        self.read_many(&ids, tx).await
    }

    /// Batched merge-update. Rows without an id and rows whose id matches
    /// nothing are skipped; the result rehydrates only the rows written.
    pub async fn bulk_update(
        &self,
        rows: Vec<Record>,
        opts: &BulkOptions,
        tx: Option<&dyn Transaction>,
        wctx: &WriteContext,
    ) -> Result<Vec<Record>> {
        match tx {
            Some(tx) => self.bulk_update_inner(rows, opts, Some(tx), wctx).await,
            None => {
                let own = self.ctx.db.begin().await?;
                let result = self
                    .bulk_update_inner(rows, opts, Some(own.as_ref()), wctx)
                    .await;
                match result {
                    Ok(records) => {
                        own.commit().await?;
                        Ok(records)
                    }
                    Err(err) => {
                        let _ = own.rollback().await;
                        Err(err)
                    }
                }
            }
        }
    }

    async fn bulk_update_inner(
        &self,
        rows: Vec<Record>,
        opts: &BulkOptions,
        tx: Option<&dyn Transaction>,
        wctx: &WriteContext,
    ) -> Result<Vec<Record>> {
        let table = self.table()?;
        let exec = self.ctx.exec(tx);
        let chunk_size = opts.chunk_size.max(1);
        let mut updated = Vec::new();

        for chunk in rows.chunks(chunk_size) {
            // Writes share one transaction handle; rows are applied in
            // sequence within the chunk, which keeps the observable effect
            // of the chunk atomic without concurrent use of the handle.
            for row in chunk {
                let shredded = shred::shred(table, row.clone());
                let Some(id) = shredded.id.clone() else {
                    warn!(table = %self.table_id, "skipping bulk update row without id");
                    continue;
                };
                let Some(existing) = self.read_blob(&id, exec).await? else {
                    warn!(table = %self.table_id, id = %ids::mask(&id), "skipping bulk update of unknown id");
                    continue;
                };
                let mut merged = existing;
                for (key, value) in shredded.data.clone() {
                    merged.insert(key, value);
                }
                self.write_blob(&id, merged, &shredded, exec, wctx).await?;
                updated.push(id);
            }
        }

        debug!(table = %self.table_id, count = updated.len(), "bulk updated records");
        self.read_many(&updated, tx).await
    }

    /// Apply one patch to every record matching the filter stack; returns
    /// the match count.
    pub async fn bulk_update_all(
        &self,
        args: &ListArgs,
        patch: Record,
        tx: Option<&dyn Transaction>,
        wctx: &WriteContext,
    ) -> Result<u64> {
        let table = self.table()?;
        let ids = self.matching_ids(args, tx).await?;
        if ids.is_empty() {
            return Ok(0);
        }
        let shredded = shred::shred(table, patch);
        let actor = shredded
            .updated_by
            .clone()
            .or_else(|| wctx.user_id.clone());
        let sql = format!(
            "UPDATE \"{RECORDS_TABLE}\" SET \"{data}\" = \"{data}\" || ?, \
             \"{updated_at}\" = ?, \"{updated_by}\" = ? \
             WHERE \"{table_id}\" = ? AND \"{id_col}\" = ANY(?)",
            data = records::DATA,
            updated_at = records::UPDATED_AT,
            updated_by = records::UPDATED_BY,
            table_id = records::TABLE_ID,
            id_col = records::ID,
        );
        let params = [
            SqlParam::Json(Value::Object(shredded.data.clone())),
            SqlParam::Timestamp(shred::now()),
            SqlParam::opt_string(actor),
            SqlParam::string(&self.table_id),
            SqlParam::StringArray(ids),
        ];
        self.ctx.exec(tx).execute(&sql, &params).await
    }

    /// Delete the given ids; returns the deleted count.
    pub async fn bulk_delete(&self, ids: &[String], tx: Option<&dyn Transaction>) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM \"{RECORDS_TABLE}\" \
             WHERE \"{table_id}\" = ? AND \"{id_col}\" = ANY(?)",
            table_id = records::TABLE_ID,
            id_col = records::ID,
        );
        let params = [
            SqlParam::string(&self.table_id),
            SqlParam::StringArray(ids.to_vec()),
        ];
        self.ctx.exec(tx).execute(&sql, &params).await
    }

    /// Delete every record matching the filter stack; returns the count.
    pub async fn bulk_delete_all(
        &self,
        args: &ListArgs,
        tx: Option<&dyn Transaction>,
    ) -> Result<u64> {
        let ids = self.matching_ids(args, tx).await?;
        self.bulk_delete(&ids, tx).await
    }

    /// Resolve the full id set matching a filter stack (no window).
    async fn matching_ids(
        &self,
        args: &ListArgs,
        tx: Option<&dyn Transaction>,
    ) -> Result<Vec<String>> {
        let table = self.table()?;
        let qctx = self.ctx.query_ctx(table);
        let mut builder = SelectBuilder::new(table, &qctx.alias)?;
        builder.project(SqlExpr::raw(format!("\"{}\".\"{}\"", qctx.alias, records::ID)));

        let mut filters: Vec<FilterNode> = args.filters.clone();
        if let Some(where_str) = &args.where_str {
            if let Some(node) = legacy::parse_where(where_str) {
                filters.push(node);
            }
        }
        if let Some(predicate) = condition::compile(&qctx, &filters)? {
            builder.and_where(predicate);
        }

        let query = builder.build();
        let rows = self.ctx.exec(tx).query_all(&query.sql, &query.params).await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(id) = row.try_get_string(records::ID)? {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Group rows by a column and aggregate per group.
    pub async fn group_by(
        &self,
        args: &GroupByArgs,
        tx: Option<&dyn Transaction>,
    ) -> Result<Vec<GroupRow>> {
        let table = self.table()?;
        let qctx = self.ctx.query_ctx(table);
        let column = qctx.column(&args.column)?;
        let key_expr = qctx.column_expr_cast(column)?;
        let key_alias = sanitize::ensure_alias(&column.name)
            .map(str::to_owned)
            .unwrap_or_else(|_| "group_key".to_owned());

        let agg_expr = match (args.agg, &args.agg_column) {
            (AggFn::Count, _) => SqlExpr::raw("COUNT(*)"),
            (agg, Some(target)) => {
                let target = qctx.column(target)?;
                let inner = qctx.column_expr_cast(target)?;
                SqlExpr::bind(format!("{}({})", agg.as_sql(), inner.sql), inner.params)
            }
            (agg, None) => {
                return Err(Error::bad_request(format!(
                    "{} aggregation requires a target column",
                    agg.as_sql()
                )));
            }
        };

        let mut builder = SelectBuilder::new(table, &qctx.alias)?;
        builder.project_as(key_expr.clone(), &key_alias)?;
        builder.project_as(agg_expr, "aggregate")?;

        let mut filters: Vec<FilterNode> = args.filters.clone();
        if let Some(where_str) = &args.where_str {
            if let Some(node) = legacy::parse_where(where_str) {
                filters.push(node);
            }
        }
        if let Some(predicate) = condition::compile(&qctx, &filters)? {
            builder.and_where(predicate);
        }
        builder.group_by(key_expr);
        builder.window(
            Some(self.ctx.limits.clamp(args.limit)),
            args.offset,
        );

        let query = builder.build();
        let rows = self.ctx.exec(tx).query_all(&query.sql, &query.params).await?;
        Ok(rows
            .iter()
            .map(|row| GroupRow {
                key: shred::row_value(row.as_ref(), &key_alias).unwrap_or(Value::Null),
                value: shred::row_value(row.as_ref(), "aggregate").unwrap_or(Value::Null),
            })
            .collect())
    }
}
