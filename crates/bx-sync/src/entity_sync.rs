//! Entity sync service: orchestrates the extract-project-load cycle for a
//! single CRM/operational entity type (full, incremental, webhook).

use bx_client::BitrixClient;
use bx_core::{BitrixError, BitrixRecord, DatabaseError, EntityType, FieldInfo, FieldMapper, SyncError};
use bx_warehouse::{table_builder, upsert, WarehousePool};
use chrono::Utc;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::result::Result;

/// Outcome of a single-record webhook sync or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    Skipped,
}

/// Summary of a full or incremental sync run, used to close the sync log.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOutcome {
    pub records_fetched: usize,
    pub records_processed: usize,
}

pub struct EntitySyncService<'a> {
    client: &'a BitrixClient,
    pool: &'a WarehousePool,
}

impl<'a> EntitySyncService<'a> {
    pub fn new(client: &'a BitrixClient, pool: &'a WarehousePool) -> Self {
        Self { client, pool }
    }

    /// §4.F.1 Full sync: fetches and merges field metadata, reconciles the
    /// table, pulls every record matching `filter` (or the default `{>ID:0}`
    /// dispatched per entity type inside the client), and upserts the batch.
    #[instrument(skip(self, filter), fields(entity_type = %entity_type))]
    pub async fn run_full(&self, entity_type: EntityType, filter: Value) -> Result<SyncOutcome> {
        let log_id = bx_warehouse::config_store::start_sync_log(self.pool, entity_type.as_str(), "full")
            .await
            .map_err(|e| self.database_err(entity_type, e))?;

        match self.run_full_inner(entity_type, filter).await {
            Ok(outcome) => {
                bx_warehouse::config_store::complete_sync_log(
                    self.pool,
                    log_id,
                    outcome.records_processed as i32,
                    outcome.records_fetched as i32,
                )
                .await
                .map_err(|e| self.database_err(entity_type, e))?;
                Ok(outcome)
            }
            Err(err) => {
                bx_warehouse::config_store::fail_sync_log(self.pool, log_id, &err.to_string())
                    .await
                    .ok();
                Err(err)
            }
        }
    }

    async fn run_full_inner(&self, entity_type: EntityType, filter: Value) -> Result<SyncOutcome> {
        let fields = self.merged_fields(entity_type).await?;
        table_builder::ensure_table(self.pool, entity_type.table_name(), &fields)
            .await
            .map_err(|e| self.database_err(entity_type, e))?;

        let records = self
            .client
            .get_entities(entity_type.as_str(), filter)
            .await
            .map_err(|e| self.bitrix_err(entity_type, e))?;

        let records_fetched = records.len();
        let records_processed = self.upsert_records(entity_type, records).await?;

        bx_warehouse::config_store::upsert_sync_state(
            self.pool,
            entity_type.as_str(),
            Some(Utc::now().naive_utc()),
            None,
            records_processed as i32,
        )
        .await
        .map_err(|e| self.database_err(entity_type, e))?;
        bx_warehouse::config_store::touch_last_sync(self.pool, entity_type.as_str(), Utc::now())
            .await
            .map_err(|e| self.database_err(entity_type, e))?;

        info!(entity_type = %entity_type, records_processed, "full sync completed");
        Ok(SyncOutcome { records_fetched, records_processed })
    }

    /// §4.F.2 Incremental sync: promotes to a full sync when the table or
    /// the high-water mark is missing; otherwise filters on the entity's
    /// compare field and only advances `last_modified_date`, never
    /// `total_records`.
    #[instrument(skip(self), fields(entity_type = %entity_type))]
    pub async fn run_incremental(&self, entity_type: EntityType) -> Result<SyncOutcome> {
        if !table_builder::table_exists(self.pool, entity_type.table_name())
            .await
            .map_err(|e| self.database_err(entity_type, e))?
        {
            return self.run_full(entity_type, Value::Null).await;
        }

        let state = bx_warehouse::config_store::get_sync_state(self.pool, entity_type.as_str())
            .await
            .map_err(|e| self.database_err(entity_type, e))?;
        let Some(last_modified) = state.and_then(|s| s.last_modified_date) else {
            return self.run_full(entity_type, Value::Null).await;
        };

        let log_id = bx_warehouse::config_store::start_sync_log(self.pool, entity_type.as_str(), "incremental")
            .await
            .map_err(|e| self.database_err(entity_type, e))?;

        let compare_field = entity_type.incremental_compare_field();
        let mut filter_map = serde_json::Map::new();
        filter_map.insert(
            format!(">{compare_field}"),
            Value::String(last_modified.format("%Y-%m-%dT%H:%M:%S").to_string()),
        );
        let filter = Value::Object(filter_map);

        let result = self.run_incremental_inner(entity_type, filter).await;
        match &result {
            Ok(outcome) => {
                bx_warehouse::config_store::complete_sync_log(
                    self.pool,
                    log_id,
                    outcome.records_processed as i32,
                    outcome.records_fetched as i32,
                )
                .await
                .ok();
            }
            Err(err) => {
                bx_warehouse::config_store::fail_sync_log(self.pool, log_id, &err.to_string())
                    .await
                    .ok();
            }
        }
        result
    }

    async fn run_incremental_inner(&self, entity_type: EntityType, filter: Value) -> Result<SyncOutcome> {
        let records = self
            .client
            .get_entities(entity_type.as_str(), filter)
            .await
            .map_err(|e| self.bitrix_err(entity_type, e))?;

        let records_fetched = records.len();
        if records.is_empty() {
            return Ok(SyncOutcome::default());
        }

        let fields = self.merged_fields(entity_type).await?;
        table_builder::ensure_table(self.pool, entity_type.table_name(), &fields)
            .await
            .map_err(|e| self.database_err(entity_type, e))?;

        let records_processed = self.upsert_records(entity_type, records).await?;

        bx_warehouse::config_store::upsert_sync_state(
            self.pool,
            entity_type.as_str(),
            Some(Utc::now().naive_utc()),
            None,
            records_processed as i32,
        )
        .await
        .map_err(|e| self.database_err(entity_type, e))?;

        Ok(SyncOutcome { records_fetched, records_processed })
    }

    /// §4.F.3 Webhook single-record sync. `skipped` when the table does not
    /// exist yet (nothing to reconcile against, and the next full sync will
    /// create it and pick the record up).
    #[instrument(skip(self), fields(entity_type = %entity_type, bitrix_id))]
    pub async fn sync_entity_by_id(&self, entity_type: EntityType, bitrix_id: &str) -> Result<WebhookOutcome> {
        if !table_builder::table_exists(self.pool, entity_type.table_name())
            .await
            .map_err(|e| self.database_err(entity_type, e))?
        {
            warn!(entity_type = %entity_type, bitrix_id, "table absent, skipping webhook sync");
            return Ok(WebhookOutcome::Skipped);
        }

        let record = self
            .client
            .get_entity(entity_type.as_str(), bitrix_id)
            .await
            .map_err(|e| self.bitrix_err(entity_type, e))?;

        let Some(record) = record else {
            return Ok(WebhookOutcome::Skipped);
        };

        self.upsert_records(entity_type, vec![record]).await?;
        Ok(WebhookOutcome::Applied)
    }

    /// §4.F.3 `DeleteEntityByID`: idempotent, `skipped` when the table does
    /// not exist.
    #[instrument(skip(self), fields(entity_type = %entity_type, bitrix_id))]
    pub async fn delete_entity_by_id(&self, entity_type: EntityType, bitrix_id: &str) -> Result<WebhookOutcome> {
        if !table_builder::table_exists(self.pool, entity_type.table_name())
            .await
            .map_err(|e| self.database_err(entity_type, e))?
        {
            return Ok(WebhookOutcome::Skipped);
        }

        let dialect = self.pool.dialect();
        let quoted_table = dialect.quote_identifier(entity_type.table_name());
        let placeholder = dialect.placeholder(1);
        let sql = format!("DELETE FROM {quoted_table} WHERE bitrix_id = {placeholder}");

        match self.pool {
            WarehousePool::PostgreSql(pg) => {
                sqlx::query(&sql).bind(bitrix_id).execute(pg).await
            }
            WarehousePool::MySql(my) => {
                sqlx::query(&sql).bind(bitrix_id).execute(my).await
            }
        }
        .map_err(|e| self.database_err(entity_type, DatabaseError::Query(e)))?;

        Ok(WebhookOutcome::Applied)
    }

    async fn merged_fields(&self, entity_type: EntityType) -> Result<Vec<FieldInfo>> {
        let prefix = entity_type.as_str();
        let raw_fields = self
            .client
            .get_entity_fields(prefix)
            .await
            .map_err(|e| self.bitrix_err(entity_type, e))?;
        let raw_user_fields = self
            .client
            .get_userfields(prefix)
            .await
            .map_err(|e| self.bitrix_err(entity_type, e))?;

        let standard = raw_fields
            .as_object()
            .map(FieldMapper::prepare_fields)
            .unwrap_or_default();
        let user_fields = user_fields_to_field_infos(raw_user_fields);

        Ok(FieldMapper::merge(standard, user_fields).into_values().collect())
    }

    async fn upsert_records(&self, entity_type: EntityType, records: Vec<Value>) -> Result<usize> {
        let column_types = upsert::get_column_types(self.pool, entity_type.table_name())
            .await
            .map_err(|e| self.database_err(entity_type, e))?;
        let dialect = self.pool.dialect();

        let mut processed = 0usize;
        for record in records {
            let record = BitrixRecord::from_value(record);
            if record.id().is_none() {
                continue;
            }
            let mut columns = Vec::new();
            let mut values = Vec::new();

            for (raw_key, raw_value) in record.iter() {
                let column_name = if raw_key.eq_ignore_ascii_case("id") {
                    "bitrix_id".to_string()
                } else {
                    raw_key.to_lowercase()
                };
                let Some(column_type) = column_types.get(&column_name) else { continue };
                columns.push(column_name);
                values.push(upsert::coerce_value(raw_value, column_type));
            }

            if !columns.contains(&"bitrix_id".to_string()) {
                continue;
            }

            let sql = upsert::build_upsert_sql(dialect, entity_type.table_name(), &["bitrix_id"], &columns);
            bind_and_execute(self.pool, &sql, &values)
                .await
                .map_err(|e| self.database_err(entity_type, DatabaseError::Query(e)))?;
            processed += 1;
        }

        Ok(processed)
    }

    fn bitrix_err(&self, entity_type: EntityType, source: BitrixError) -> SyncError {
        SyncError::bitrix(entity_type.as_str(), source)
    }

    fn database_err(&self, entity_type: EntityType, source: DatabaseError) -> SyncError {
        SyncError::database(entity_type.as_str(), source)
    }
}

/// User-field metadata arrives in the same shape as standard fields.
fn user_fields_to_field_infos(raw: Vec<Value>) -> Vec<FieldInfo> {
    let map: serde_json::Map<String, Value> = raw
        .into_iter()
        .filter_map(|v| {
            let id = v.get("FIELD_NAME").or_else(|| v.get("field_name"))?.as_str()?.to_string();
            Some((id, v))
        })
        .collect();
    FieldMapper::prepare_user_fields(&map)
}

async fn bind_and_execute(
    pool: &WarehousePool,
    sql: &str,
    values: &[upsert::CoercedValue],
) -> std::result::Result<(), sqlx::Error> {
    use upsert::{ColumnKind, CoercedValue::*};

    match pool {
        WarehousePool::PostgreSql(pg) => {
            let mut query = sqlx::query(sql);
            for value in values {
                query = match value {
                    Null(ColumnKind::Integer) => query.bind(None::<i64>),
                    Null(ColumnKind::Decimal) => query.bind(None::<bigdecimal::BigDecimal>),
                    Null(ColumnKind::Boolean) => query.bind(None::<bool>),
                    Null(ColumnKind::Timestamp) => query.bind(None::<chrono::NaiveDateTime>),
                    Null(ColumnKind::Text) => query.bind(None::<String>),
                    Text(s) => query.bind(s.clone()),
                    Integer(i) => query.bind(*i),
                    Decimal(d) => query.bind(d.clone()),
                    Boolean(b) => query.bind(*b),
                    Timestamp(t) => query.bind(*t),
                };
            }
            query.execute(pg).await?;
        }
        WarehousePool::MySql(my) => {
            let mut query = sqlx::query(sql);
            for value in values {
                query = match value {
                    Null(ColumnKind::Integer) => query.bind(None::<i64>),
                    Null(ColumnKind::Decimal) => query.bind(None::<bigdecimal::BigDecimal>),
                    Null(ColumnKind::Boolean) => query.bind(None::<bool>),
                    Null(ColumnKind::Timestamp) => query.bind(None::<chrono::NaiveDateTime>),
                    Null(ColumnKind::Text) => query.bind(None::<String>),
                    Text(s) => query.bind(s.clone()),
                    Integer(i) => query.bind(*i),
                    Decimal(d) => query.bind(d.clone()),
                    Boolean(b) => query.bind(*b),
                    Timestamp(t) => query.bind(*t),
                };
            }
            query.execute(my).await?;
        }
    }
    Ok(())
}
