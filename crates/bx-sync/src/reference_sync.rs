//! Reference sync service: synchronises the fixed dictionary tables
//! (statuses, deal categories, currencies) declared in the reference
//! registry. Mirrors the entity sync service's arc but keys on a
//! composite natural key instead of `bitrix_id`.

use bx_client::BitrixClient;
use bx_core::{BitrixError, BitrixRecord, DatabaseError, ReferenceType, SyncError, REFERENCE_TYPES};
use bx_warehouse::{table_builder, upsert, WarehousePool};
use futures::future::join_all;
use serde_json::Value;
use tracing::{info, instrument};

use crate::result::Result;

pub struct ReferenceSyncService<'a> {
    client: &'a BitrixClient,
    pool: &'a WarehousePool,
}

impl<'a> ReferenceSyncService<'a> {
    pub fn new(client: &'a BitrixClient, pool: &'a WarehousePool) -> Self {
        Self { client, pool }
    }

    /// Runs every registered reference type in sequence, returning the
    /// total number of rows upserted.
    #[instrument(skip(self))]
    pub async fn sync_all(&self) -> Result<usize> {
        let mut total = 0usize;
        for reference_type in REFERENCE_TYPES {
            total += self.sync_one(reference_type.name).await?;
        }
        Ok(total)
    }

    /// §4.G Syncs a single registered reference type by name.
    #[instrument(skip(self), fields(reference_type = name))]
    pub async fn sync_one(&self, name: &str) -> Result<usize> {
        let reference_type = REFERENCE_TYPES
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| SyncError::Config { message: format!("unknown reference type: {name}") })?;

        let log_id = bx_warehouse::config_store::start_sync_log(self.pool, reference_type.name, "reference")
            .await
            .map_err(|e| self.database_err(reference_type, e))?;

        match self.sync_one_inner(reference_type).await {
            Ok(processed) => {
                bx_warehouse::config_store::complete_sync_log(self.pool, log_id, processed as i32, processed as i32)
                    .await
                    .ok();
                Ok(processed)
            }
            Err(err) => {
                bx_warehouse::config_store::fail_sync_log(self.pool, log_id, &err.to_string())
                    .await
                    .ok();
                Err(err)
            }
        }
    }

    async fn sync_one_inner(&self, reference_type: &ReferenceType) -> Result<usize> {
        self.ensure_reference_table(reference_type).await?;

        let records = self.fetch_records(reference_type).await?;
        let processed = self.upsert_records(reference_type, records).await?;

        info!(reference_type = reference_type.name, processed, "reference sync completed");
        Ok(processed)
    }

    async fn ensure_reference_table(&self, reference_type: &ReferenceType) -> Result<()> {
        let fields: Vec<bx_core::FieldInfo> = reference_type
            .fields
            .iter()
            .map(|f| bx_core::FieldInfo {
                column_name: f.column_name.to_string(),
                field_id: f.column_name.to_string(),
                sql_type_name: f.sql_type,
                description: None,
            })
            .collect();
        table_builder::ensure_table(self.pool, reference_type.table_name, &fields)
            .await
            .map_err(|e| self.database_err(reference_type, e))
    }

    async fn fetch_records(&self, reference_type: &ReferenceType) -> Result<Vec<Value>> {
        match reference_type.name {
            "crm_deal_category" => self.fetch_deal_categories().await,
            "crm_status" => self.fetch_statuses().await,
            "enum_values" => Ok(Vec::new()),
            _ => {
                self.client
                    .call(reference_type.api_method, serde_json::json!({}))
                    .await
                    .map(|v| v.as_array().cloned().unwrap_or_default())
                    .map_err(|e| self.bitrix_err(reference_type, e))
            }
        }
    }

    /// Bitrix omits the default pipeline (id `0`) from
    /// `crm.dealcategory.list`; it is fetched separately and prepended.
    async fn fetch_deal_categories(&self) -> Result<Vec<Value>> {
        let default = self
            .client
            .call("crm.dealcategory.default.get", serde_json::json!({}))
            .await
            .map_err(|e| SyncError::bitrix("crm_deal_category", e))?;

        let mut categories = self
            .client
            .call("crm.dealcategory.list", serde_json::json!({}))
            .await
            .map(|v| v.as_array().cloned().unwrap_or_default())
            .map_err(|e| SyncError::bitrix("crm_deal_category", e))?;

        let mut all = vec![default];
        all.append(&mut categories);
        Ok(all)
    }

    /// §4.G crm_status with category iteration: base statuses, plus one
    /// `crm.dealcategory.stage.list` call per deal category (including the
    /// implicit default category `"0"`), fanned out concurrently and
    /// deduplicated by the composite natural key.
    async fn fetch_statuses(&self) -> Result<Vec<Value>> {
        let base = self
            .client
            .call("crm.status.list", serde_json::json!({}))
            .await
            .map(|v| v.as_array().cloned().unwrap_or_default())
            .map_err(|e| SyncError::bitrix("crm_status", e))?;

        let categories = self.fetch_deal_categories().await?;
        let mut category_ids: Vec<String> = categories
            .iter()
            .filter_map(|c| c.get("ID").and_then(Value::as_str).map(str::to_string))
            .collect();
        if !category_ids.iter().any(|id| id == "0") {
            category_ids.push("0".to_string());
        }

        let client = self.client;
        let stage_futures = category_ids.iter().map(|category_id| {
            let category_id = category_id.clone();
            async move {
                let params = serde_json::json!({ "filter": { "CATEGORY_ID": category_id } });
                let result = client.call("crm.dealcategory.stage.list", params).await;
                (category_id, result)
            }
        });

        let mut rows = default_missing_category_id(base);
        for (category_id, result) in join_all(stage_futures).await {
            let stages = result.map_err(|e| SyncError::bitrix("crm_status", e))?;
            let entity_id = if category_id == "0" {
                "DEAL_STAGE".to_string()
            } else {
                format!("DEAL_STAGE_{category_id}")
            };
            if let Some(items) = stages.as_array() {
                for stage in items {
                    let mut stage = stage.clone();
                    if let Some(obj) = stage.as_object_mut() {
                        obj.insert("ENTITY_ID".to_string(), Value::String(entity_id.clone()));
                        obj.insert("CATEGORY_ID".to_string(), Value::String(category_id.clone()));
                    }
                    rows.push(stage);
                }
            }
        }

        Ok(dedup_by_natural_key(rows, &["STATUS_ID", "ENTITY_ID", "CATEGORY_ID"]))
    }

    async fn upsert_records(&self, reference_type: &ReferenceType, records: Vec<Value>) -> Result<usize> {
        let column_types = upsert::get_column_types(self.pool, reference_type.table_name)
            .await
            .map_err(|e| self.database_err(reference_type, e))?;
        let dialect = self.pool.dialect();

        let mut processed = 0usize;
        for record in records {
            let record = BitrixRecord::from_value(record);
            let mut columns = Vec::new();
            let mut values = Vec::new();

            for (raw_key, raw_value) in record.iter() {
                let column_name = raw_key.to_lowercase();
                let Some(column_type) = column_types.get(&column_name) else { continue };
                columns.push(column_name);
                values.push(upsert::coerce_value(raw_value, column_type));
            }

            if reference_type.unique_key.iter().any(|k| !columns.iter().any(|c| c.as_str() == *k)) {
                continue;
            }

            let sql = upsert::build_upsert_sql(dialect, reference_type.table_name, reference_type.unique_key, &columns);
            bind_and_execute(self.pool, &sql, &values)
                .await
                .map_err(|e| self.database_err(reference_type, DatabaseError::Query(e)))?;
            processed += 1;
        }

        Ok(processed)
    }

    fn bitrix_err(&self, reference_type: &ReferenceType, source: BitrixError) -> SyncError {
        SyncError::bitrix(reference_type.name, source)
    }

    fn database_err(&self, reference_type: &ReferenceType, source: DatabaseError) -> SyncError {
        SyncError::database(reference_type.name, source)
    }
}

/// `crm.status.list` rows (lead statuses, sources, etc.) carry no
/// `CATEGORY_ID` at all; the deal-stage rows fanned out separately always
/// do. Defaults the former to `"0"` so `STATUS_FIELDS`' non-nullable
/// `category_id` column never drops a base status row on upsert.
fn default_missing_category_id(rows: Vec<Value>) -> Vec<Value> {
    rows.into_iter()
        .map(|mut row| {
            if let Some(obj) = row.as_object_mut() {
                let missing = obj
                    .get("CATEGORY_ID")
                    .map(|v| v.is_null() || v.as_str() == Some(""))
                    .unwrap_or(true);
                if missing {
                    obj.insert("CATEGORY_ID".to_string(), Value::String("0".to_string()));
                }
            }
            row
        })
        .collect()
}

fn dedup_by_natural_key(rows: Vec<Value>, key_fields: &[&str]) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::new();
    for row in rows {
        let key: Vec<String> = key_fields
            .iter()
            .map(|f| row.get(*f).and_then(Value::as_str).unwrap_or("").to_string())
            .collect();
        if seen.insert(key) {
            deduped.push(row);
        }
    }
    deduped
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_missing_category_id_fills_absent_field() {
        let rows = vec![
            json!({"STATUS_ID": "NEW", "NAME": "New lead"}),
            json!({"STATUS_ID": "IN_PROCESS", "CATEGORY_ID": Value::Null}),
            json!({"STATUS_ID": "CONVERTED", "CATEGORY_ID": "3"}),
        ];
        let filled = default_missing_category_id(rows);
        assert_eq!(filled[0]["CATEGORY_ID"], json!("0"));
        assert_eq!(filled[1]["CATEGORY_ID"], json!("0"));
        assert_eq!(filled[2]["CATEGORY_ID"], json!("3"));
    }

    #[test]
    fn dedup_keeps_first_occurrence_of_natural_key() {
        let rows = vec![
            json!({"STATUS_ID": "NEW", "ENTITY_ID": "DEAL_STAGE", "CATEGORY_ID": "0", "NAME": "New"}),
            json!({"STATUS_ID": "NEW", "ENTITY_ID": "DEAL_STAGE", "CATEGORY_ID": "0", "NAME": "Duplicate"}),
            json!({"STATUS_ID": "WON", "ENTITY_ID": "DEAL_STAGE", "CATEGORY_ID": "0", "NAME": "Won"}),
        ];
        let deduped = dedup_by_natural_key(rows, &["STATUS_ID", "ENTITY_ID", "CATEGORY_ID"]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0]["NAME"], json!("New"));
    }
}
