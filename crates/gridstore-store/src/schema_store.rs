//! Versioned schema persistence.
//!
//! Snapshots are immutable rows; mutation happens by applying a patch batch
//! to the latest DEV snapshot and writing the result as a new version.
//! Publishing copies the latest DEV snapshot over PRO atomically.

use std::sync::Arc;

use gridstore_domain::constants::{SCHEMAS_TABLE, schemas};
use gridstore_domain::error::{Error, Result};
use gridstore_domain::ids;
use gridstore_domain::ports::{DatabaseExecutor, SqlParam, SqlRow, Transaction};
use gridstore_domain::schema::{PatchOp, SchemaEnv, SchemaRecord, apply_patch};
use serde_json::Value;
use tracing::debug;

use crate::context::StoreContext;
use crate::shred;

/// Outcome of one patch batch against the DEV snapshot.
#[derive(Debug)]
pub struct PatchApplied {
    /// The snapshot after application: bumped when anything applied,
    /// otherwise the unchanged latest.
    pub record: SchemaRecord,
    /// The prefix of the batch that applied.
    pub applied: Vec<PatchOp>,
    /// The failure that stopped the batch, if any.
    pub error: Option<Error>,
}

/// Store for versioned schema snapshots.
pub struct SchemaStore {
    ctx: Arc<StoreContext>,
}

impl SchemaStore {
    /// Store bound to a context.
    pub fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }

    /// The highest version for (domain, entity, env), if any.
    pub async fn latest(
        &self,
        domain: &str,
        entity_id: &str,
        env: SchemaEnv,
        tx: Option<&dyn Transaction>,
    ) -> Result<Option<SchemaRecord>> {
        let sql = format!(
            "SELECT * FROM \"{SCHEMAS_TABLE}\" \
             WHERE \"{domain}\" = ? AND \"{entity}\" = ? AND \"{env}\" = ? \
             ORDER BY \"{version}\" DESC LIMIT 1",
            domain = schemas::DOMAIN,
            entity = schemas::ENTITY_ID,
            env = schemas::ENV,
            version = schemas::VERSION,
        );
        let params = [
            SqlParam::string(domain),
            SqlParam::string(entity_id),
            SqlParam::string(env.as_str()),
        ];
        let row = self.ctx.exec(tx).query_one(&sql, &params).await?;
        row.map(|row| row_to_schema_record(row.as_ref())).transpose()
    }

    /// One specific version.
    pub async fn version(
        &self,
        domain: &str,
        entity_id: &str,
        env: SchemaEnv,
        version: i64,
        tx: Option<&dyn Transaction>,
    ) -> Result<Option<SchemaRecord>> {
        let sql = format!(
            "SELECT * FROM \"{SCHEMAS_TABLE}\" \
             WHERE \"{domain}\" = ? AND \"{entity}\" = ? AND \"{env}\" = ? AND \"{version}\" = ? \
             LIMIT 1",
            domain = schemas::DOMAIN,
            entity = schemas::ENTITY_ID,
            env = schemas::ENV,
            version = schemas::VERSION,
        );
        let params = [
            SqlParam::string(domain),
            SqlParam::string(entity_id),
            SqlParam::string(env.as_str()),
            SqlParam::I64(version),
        ];
        let row = self.ctx.exec(tx).query_one(&sql, &params).await?;
        row.map(|row| row_to_schema_record(row.as_ref())).transpose()
    }

    /// Write the next version for (domain, entity, env): latest + 1, or 1
    /// when this is the first snapshot.
    pub async fn save_version(
        &self,
        domain: &str,
        entity_id: &str,
        project_id: &str,
        env: SchemaEnv,
        schema: Value,
        tx: Option<&dyn Transaction>,
    ) -> Result<SchemaRecord> {
        let next = self
            .latest(domain, entity_id, env, tx)
            .await?
            .map_or(1, |record| record.version + 1);
        let record = self
            .insert_row(domain, entity_id, project_id, env, next, schema, self.ctx.exec(tx))
            .await?;
        debug!(
            domain,
            entity = entity_id,
            env = env.as_str(),
            version = next,
            "saved schema version"
        );
        Ok(record)
    }

    async fn insert_row(
        &self,
        domain: &str,
        entity_id: &str,
        project_id: &str,
        env: SchemaEnv,
        version: i64,
        schema: Value,
        exec: &dyn DatabaseExecutor,
    ) -> Result<SchemaRecord> {
        let now = shred::now();
        let record = SchemaRecord {
            id: ids::generate(),
            domain: domain.to_owned(),
            entity_id: entity_id.to_owned(),
            project_id: project_id.to_owned(),
            env,
            version,
            schema,
            created_at: now,
            updated_at: now,
        };
        let sql = format!(
            "INSERT INTO \"{SCHEMAS_TABLE}\" \
             (\"{id}\", \"{domain}\", \"{entity}\", \"{project}\", \"{env}\", \"{version}\", \
             \"{schema}\", \"{created}\", \"{updated}\") VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            id = schemas::ID,
            domain = schemas::DOMAIN,
            entity = schemas::ENTITY_ID,
            project = schemas::PROJECT_ID,
            env = schemas::ENV,
            version = schemas::VERSION,
            schema = schemas::SCHEMA,
            created = schemas::CREATED_AT,
            updated = schemas::UPDATED_AT,
        );
        let params = [
            SqlParam::string(&record.id),
            SqlParam::string(&record.domain),
            SqlParam::string(&record.entity_id),
            SqlParam::string(&record.project_id),
            SqlParam::string(record.env.as_str()),
            SqlParam::I64(record.version),
            SqlParam::Json(record.schema.clone()),
            SqlParam::Timestamp(record.created_at),
            SqlParam::Timestamp(record.updated_at),
        ];
        exec.execute(&sql, &params).await?;
        Ok(record)
    }

    /// Apply a patch batch to the latest DEV snapshot, fail-at-first. When
    /// any prefix applied, the mutated tree is written as a bumped version;
    /// an empty prefix leaves the store untouched.
    pub async fn apply_patch(
        &self,
        domain: &str,
        entity_id: &str,
        project_id: &str,
        ops: Vec<PatchOp>,
    ) -> Result<PatchApplied> {
        let latest = self
            .latest(domain, entity_id, SchemaEnv::Dev, None)
            .await?
            .ok_or_else(|| Error::not_found(format!("schema {domain}/{entity_id} (DEV)")))?;

        let mut tree = latest.schema.clone();
        let outcome = apply_patch(&mut tree, ops);
        if outcome.applied.is_empty() {
            return Ok(PatchApplied {
                record: latest,
                applied: outcome.applied,
                error: outcome.error,
            });
        }

        let record = self
            .save_version(domain, entity_id, project_id, SchemaEnv::Dev, tree, None)
            .await?;
        Ok(PatchApplied {
            record,
            applied: outcome.applied,
            error: outcome.error,
        })
    }

    /// Copy the latest DEV snapshot into PRO, creating or overwriting the
    /// published version atomically. Later DEV patches leave PRO untouched
    /// until the next publish.
    pub async fn publish(
        &self,
        domain: &str,
        entity_id: &str,
        project_id: &str,
    ) -> Result<SchemaRecord> {
        let tx = self.ctx.db.begin().await?;
        let result = self
            .publish_in_tx(domain, entity_id, project_id, tx.as_ref())
            .await;
        match result {
            Ok(record) => {
                tx.commit().await?;
                Ok(record)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    async fn publish_in_tx(
        &self,
        domain: &str,
        entity_id: &str,
        project_id: &str,
        tx: &dyn Transaction,
    ) -> Result<SchemaRecord> {
        let dev = self
            .latest(domain, entity_id, SchemaEnv::Dev, Some(tx))
            .await?
            .ok_or_else(|| Error::not_found(format!("schema {domain}/{entity_id} (DEV)")))?;

        let delete = format!(
            "DELETE FROM \"{SCHEMAS_TABLE}\" \
             WHERE \"{domain}\" = ? AND \"{entity}\" = ? AND \"{env}\" = ?",
            domain = schemas::DOMAIN,
            entity = schemas::ENTITY_ID,
            env = schemas::ENV,
        );
        let params = [
            SqlParam::string(domain),
            SqlParam::string(entity_id),
            SqlParam::string(SchemaEnv::Pro.as_str()),
        ];
        self.ctx.exec(Some(tx)).execute(&delete, &params).await?;

        let record = self
            .insert_row(
                domain,
                entity_id,
                project_id,
                SchemaEnv::Pro,
                dev.version,
                dev.schema,
                self.ctx.exec(Some(tx)),
            )
            .await?;
        debug!(domain, entity = entity_id, version = record.version, "published schema");
        Ok(record)
    }
}

fn row_to_schema_record(row: &dyn SqlRow) -> Result<SchemaRecord> {
    let env: SchemaEnv = row
        .try_get_string(schemas::ENV)?
        .ok_or_else(|| Error::internal("schema row is missing env"))?
        .parse()
        .map_err(Error::internal)?;
    Ok(SchemaRecord {
        id: required(row, schemas::ID)?,
        domain: required(row, schemas::DOMAIN)?,
        entity_id: required(row, schemas::ENTITY_ID)?,
        project_id: required(row, schemas::PROJECT_ID)?,
        env,
        version: row
            .try_get_i64(schemas::VERSION)?
            .ok_or_else(|| Error::internal("schema row is missing version"))?,
        schema: row.try_get_json(schemas::SCHEMA)?.unwrap_or(Value::Null),
        created_at: row
            .try_get_timestamp(schemas::CREATED_AT)?
            .unwrap_or_else(shred::now),
        updated_at: row
            .try_get_timestamp(schemas::UPDATED_AT)?
            .unwrap_or_else(shred::now),
    })
}

fn required(row: &dyn SqlRow, name: &str) -> Result<String> {
    row.try_get_string(name)?
        .ok_or_else(|| Error::internal(format!("schema row is missing {name}")))
}
