//! Batched relation loading.
//!
//! Collapses the N+1 pattern: one query per relation column fetches the
//! children for a whole set of parent records, fused with the edge lookup
//! for many-to-many columns. Loaded sets are cached per column for the
//! lifetime of the loader instance: request scope, no TTL.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use gridstore_domain::constants::{LINKS_TABLE, RECORDS_TABLE, links, records};
use gridstore_domain::error::{Error, Result};
use gridstore_domain::filter::ListArgs;
use gridstore_domain::ports::{SqlParam, Transaction};
use gridstore_domain::record::Record;
use gridstore_domain::sanitize;
use gridstore_domain::schema::{Column, LinkKind, LinkSpec};
use gridstore_query::SqlExpr;
use serde_json::Value;
use tracing::debug;

use crate::context::StoreContext;
use crate::records::RecordOps;
use crate::shred;

type RelationMap = HashMap<String, Vec<Record>>;

/// Request-scoped batched relation loader for one table.
pub struct LazyLoader {
    ctx: Arc<StoreContext>,
    table_id: String,
    cache: Mutex<HashMap<String, RelationMap>>,
}

impl LazyLoader {
    /// Loader for `table_id`; fails when the table is unknown.
    pub fn new(ctx: Arc<StoreContext>, table_id: &str) -> Result<Self> {
        ctx.table(table_id)?;
        Ok(Self {
            ctx,
            table_id: table_id.to_owned(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn records_ops(&self) -> Result<RecordOps> {
        RecordOps::new(Arc::clone(&self.ctx), &self.table_id)
    }

    fn link_column(&self, column_key: &str) -> Result<(Column, LinkSpec)> {
        let table = self.ctx.table(&self.table_id)?;
        let column = table
            .column(column_key)
            .ok_or_else(|| Error::not_found(format!("link column {column_key}")))?;
        let spec = column
            .kind
            .link_spec()
            .ok_or_else(|| Error::bad_request(format!("column {column_key} is not a link column")))?;
        Ok((column.clone(), spec.clone()))
    }

    /// Drop cached relation sets, for one column or all of them.
    pub fn clear_cache(&self, column_id: Option<&str>) {
        if let Ok(mut cache) = self.cache.lock() {
            match column_id {
                Some(column_id) => {
                    cache.remove(column_id);
                }
                None => cache.clear(),
            }
        }
    }

    fn cached(&self, column_id: &str, parent_ids: &[String]) -> Option<RelationMap> {
        let cache = self.cache.lock().ok()?;
        let per_column = cache.get(column_id)?;
        let mut out = RelationMap::new();
        for parent in parent_ids {
            out.insert(parent.clone(), per_column.get(parent)?.clone());
        }
        Some(out)
    }

    fn store(&self, column_id: &str, loaded: &RelationMap) {
        if let Ok(mut cache) = self.cache.lock() {
            cache
                .entry(column_id.to_owned())
                .or_default()
                .extend(loaded.clone());
        }
    }

    /// Load the related records for every parent in `parents`, grouped by
    /// parent id. One backend query per call (per relation column); cached
    /// parents are served from memory.
    pub async fn batch_load_related(
        &self,
        parents: &[Record],
        column_key: &str,
        tx: Option<&dyn Transaction>,
    ) -> Result<RelationMap> {
        let (column, spec) = self.link_column(column_key)?;
        let parent_ids: Vec<String> = parents
            .iter()
            .filter_map(|record| match record.get(records::ID) {
                Some(Value::String(id)) => Some(id.clone()),
                _ => None,
            })
            .collect();

        if let Some(cached) = self.cached(&column.id, &parent_ids) {
            debug!(column = %column.id, "serving relation batch from cache");
            return Ok(cached);
        }

        let mut loaded = match spec.kind {
            LinkKind::ManyToMany => self.load_mm(&column, &spec, &parent_ids, tx).await?,
            LinkKind::HasMany => self.load_hm(&spec, &parent_ids, tx).await?,
            LinkKind::BelongsTo => self.load_bt(&spec, parents, tx).await?,
        };
        for parent in &parent_ids {
            loaded.entry(parent.clone()).or_default();
        }

        self.store(&column.id, &loaded);
        Ok(loaded)
    }

    /// Fused edge+child query: one round trip per column.
    async fn load_mm(
        &self,
        column: &Column,
        spec: &LinkSpec,
        parent_ids: &[String],
        tx: Option<&dyn Transaction>,
    ) -> Result<RelationMap> {
        let related = self.ctx.table(&spec.related_table_id)?;
        let sql = format!(
            "SELECT \"lk\".\"{source}\" AS \"parent_id\", \"r\".\"{id}\", \"r\".\"{data}\", \
             \"r\".\"{created_at}\", \"r\".\"{updated_at}\", \"r\".\"{created_by}\", \"r\".\"{updated_by}\" \
             FROM \"{LINKS_TABLE}\" \"lk\" \
             JOIN \"{RECORDS_TABLE}\" \"r\" ON \"r\".\"{id}\" = \"lk\".\"{target}\" \
             WHERE \"lk\".\"{field}\" = ? AND \"lk\".\"{source}\" = ANY(?) AND \"r\".\"{table_id}\" = ? \
             ORDER BY \"lk\".\"{created_at}\" ASC NULLS LAST",
            source = links::SOURCE_RECORD_ID,
            target = links::TARGET_RECORD_ID,
            field = links::LINK_FIELD_ID,
            id = records::ID,
            data = records::DATA,
            created_at = records::CREATED_AT,
            updated_at = records::UPDATED_AT,
            created_by = records::CREATED_BY,
            updated_by = records::UPDATED_BY,
            table_id = records::TABLE_ID,
        );
        let params = [
            SqlParam::string(&column.id),
            SqlParam::StringArray(parent_ids.to_vec()),
            SqlParam::string(&spec.related_table_id),
        ];
        let rows = self.ctx.exec(tx).query_all(&sql, &params).await?;

        let mut out = RelationMap::new();
        for row in rows {
            let parent = row
                .try_get_string("parent_id")?
                .ok_or_else(|| Error::internal("edge row is missing its parent id"))?;
            let child = shred::deshred(related, row.as_ref(), None, &[])?;
            out.entry(parent).or_default().push(child);
        }
        Ok(out)
    }

    /// Children carry the parent id in their FK column; one query, grouped
    /// in memory.
    async fn load_hm(
        &self,
        spec: &LinkSpec,
        parent_ids: &[String],
        tx: Option<&dyn Transaction>,
    ) -> Result<RelationMap> {
        let fk = spec
            .fk_column_name
            .as_deref()
            .ok_or_else(|| Error::bad_request("link column is missing its FK storage name"))?;
        let fk = sanitize::ensure_storage_name(fk)?;
        let predicate = SqlExpr::bind(
            format!("\"base\".\"{}\" ->> '{fk}' = ANY(?)", records::DATA),
            vec![SqlParam::StringArray(parent_ids.to_vec())],
        );
        let children = RecordOps::new(Arc::clone(&self.ctx), &spec.related_table_id)?
            .list_all_with_predicate(predicate, tx)
            .await?;

        let mut out = RelationMap::new();
        for child in children {
            let Some(Value::String(parent)) = child.get(fk) else {
                continue;
            };
            out.entry(parent.clone()).or_default().push(child);
        }
        Ok(out)
    }

    /// The parent rows carry the FK; fetch the referenced records and hand
    /// each parent its single target.
    async fn load_bt(
        &self,
        spec: &LinkSpec,
        parents: &[Record],
        tx: Option<&dyn Transaction>,
    ) -> Result<RelationMap> {
        let fk = spec
            .fk_column_name
            .as_deref()
            .ok_or_else(|| Error::bad_request("link column is missing its FK storage name"))?;

        let mut wanted: HashSet<String> = HashSet::new();
        let mut parent_to_fk: Vec<(String, String)> = Vec::new();
        for parent in parents {
            let Some(Value::String(parent_id)) = parent.get(records::ID) else {
                continue;
            };
            if let Some(Value::String(target)) = parent.get(fk) {
                wanted.insert(target.clone());
                parent_to_fk.push((parent_id.clone(), target.clone()));
            }
        }

        let targets: Vec<String> = wanted.into_iter().collect();
        let fetched = RecordOps::new(Arc::clone(&self.ctx), &spec.related_table_id)?
            .read_many(&targets, tx)
            .await?;
        let by_id: HashMap<String, Record> = fetched
            .into_iter()
            .filter_map(|record| match record.get(records::ID) {
                Some(Value::String(id)) => Some((id.clone(), record)),
                _ => None,
            })
            .collect();

        let mut out = RelationMap::new();
        for (parent_id, target) in parent_to_fk {
            if let Some(record) = by_id.get(&target) {
                out.entry(parent_id).or_default().push(record.clone());
            }
        }
        Ok(out)
    }

    /// Attach loaded children to each parent under the column's storage
    /// name.
    fn attach(parents: &mut [Record], column: &Column, loaded: &RelationMap) {
        for parent in parents.iter_mut() {
            let Some(Value::String(parent_id)) = parent.get(records::ID) else {
                continue;
            };
            let children = loaded
                .get(parent_id.as_str())
                .map(|records| {
                    records
                        .iter()
                        .map(|r| Value::Object(r.clone()))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            parent.insert(column.name.clone(), Value::Array(children));
        }
    }

    /// `list` composed with a batched load per requested relation column.
    pub async fn list_with_relations(
        &self,
        args: &ListArgs,
        preload_relations: &[String],
        tx: Option<&dyn Transaction>,
    ) -> Result<Vec<Record>> {
        let mut parents = self.records_ops()?.list(args, false, tx).await?;
        for column_key in preload_relations {
            let (column, _) = self.link_column(column_key)?;
            let loaded = self.batch_load_related(&parents, column_key, tx).await?;
            Self::attach(&mut parents, &column, &loaded);
        }
        Ok(parents)
    }

    /// Single-record variant of [`Self::list_with_relations`].
    pub async fn read_by_pk_with_relations(
        &self,
        id: &str,
        load_relations: &[String],
        tx: Option<&dyn Transaction>,
    ) -> Result<Option<Record>> {
        let Some(record) = self.records_ops()?.read_by_pk(id, None, tx).await? else {
            return Ok(None);
        };
        let mut parents = vec![record];
        for column_key in load_relations {
            let (column, _) = self.link_column(column_key)?;
            let loaded = self.batch_load_related(&parents, column_key, tx).await?;
            Self::attach(&mut parents, &column, &loaded);
        }
        Ok(parents.into_iter().next())
    }
}
