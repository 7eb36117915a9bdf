//! Sync-config / sync-state / sync-logs store: the three administrative
//! tables that drive the scheduler and record sync history.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::pool::WarehousePool;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncConfig {
    pub id: i64,
    pub entity_type: String,
    pub enabled: bool,
    pub sync_interval_minutes: i32,
    pub webhook_enabled: bool,
    pub last_sync_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncLog {
    pub id: i64,
    pub entity_type: String,
    pub sync_type: String,
    pub status: String,
    pub records_processed: Option<i32>,
    pub records_fetched: Option<i32>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncState {
    pub entity_type: String,
    pub last_modified_date: Option<NaiveDateTime>,
    pub last_bitrix_id: Option<String>,
    pub total_records: i32,
}

const SELECT_CONFIG: &str =
    "SELECT id, entity_type, enabled, sync_interval_minutes, webhook_enabled, last_sync_at FROM sync_config";

/// Lists every configured entity type, enabled or not — the scheduler
/// filters by `enabled` itself so disabled rows remain visible to `bx-cli`.
#[instrument(skip(pool))]
pub async fn list_sync_configs(pool: &WarehousePool) -> Result<Vec<SyncConfig>> {
    let sql = format!("{SELECT_CONFIG} ORDER BY entity_type");
    let configs = match pool {
        WarehousePool::PostgreSql(pg) => sqlx::query_as::<_, SyncConfig>(&sql).fetch_all(pg).await?,
        WarehousePool::MySql(my) => sqlx::query_as::<_, SyncConfig>(&sql).fetch_all(my).await?,
    };
    Ok(configs)
}

pub async fn get_sync_config(pool: &WarehousePool, entity_type: &str) -> Result<Option<SyncConfig>> {
    let config = match pool {
        WarehousePool::PostgreSql(pg) => {
            let sql = format!("{SELECT_CONFIG} WHERE entity_type = $1");
            sqlx::query_as::<_, SyncConfig>(&sql)
                .bind(entity_type)
                .fetch_optional(pg)
                .await?
        }
        WarehousePool::MySql(my) => {
            let sql = format!("{SELECT_CONFIG} WHERE entity_type = ?");
            sqlx::query_as::<_, SyncConfig>(&sql)
                .bind(entity_type)
                .fetch_optional(my)
                .await?
        }
    };
    Ok(config)
}

/// Inserts a `sync_config` row for `entity_type` if absent, otherwise
/// updates the editable fields in place (operator-driven reconfiguration,
/// not a reschedule — the scheduler re-reads this table on every tick).
#[instrument(skip(pool))]
pub async fn upsert_sync_config(
    pool: &WarehousePool,
    entity_type: &str,
    enabled: bool,
    sync_interval_minutes: i32,
    webhook_enabled: bool,
) -> Result<()> {
    match pool {
        WarehousePool::PostgreSql(pg) => {
            sqlx::query(
                "INSERT INTO sync_config (entity_type, enabled, sync_interval_minutes, webhook_enabled, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, now(), now())
                 ON CONFLICT (entity_type) DO UPDATE SET
                    enabled = EXCLUDED.enabled,
                    sync_interval_minutes = EXCLUDED.sync_interval_minutes,
                    webhook_enabled = EXCLUDED.webhook_enabled,
                    updated_at = now()",
            )
            .bind(entity_type)
            .bind(enabled)
            .bind(sync_interval_minutes)
            .bind(webhook_enabled)
            .execute(pg)
            .await?;
        }
        WarehousePool::MySql(my) => {
            sqlx::query(
                "INSERT INTO sync_config (entity_type, enabled, sync_interval_minutes, webhook_enabled, created_at, updated_at)
                 VALUES (?, ?, ?, ?, NOW(), NOW())
                 ON DUPLICATE KEY UPDATE
                    enabled = VALUES(enabled),
                    sync_interval_minutes = VALUES(sync_interval_minutes),
                    webhook_enabled = VALUES(webhook_enabled),
                    updated_at = NOW()",
            )
            .bind(entity_type)
            .bind(enabled)
            .bind(sync_interval_minutes)
            .bind(webhook_enabled)
            .execute(my)
            .await?;
        }
    }
    debug!(entity_type, "sync_config upserted");
    Ok(())
}

pub async fn touch_last_sync(pool: &WarehousePool, entity_type: &str, at: DateTime<Utc>) -> Result<()> {
    let naive = at.naive_utc();
    match pool {
        WarehousePool::PostgreSql(pg) => {
            sqlx::query("UPDATE sync_config SET last_sync_at = $1, updated_at = now() WHERE entity_type = $2")
                .bind(naive)
                .bind(entity_type)
                .execute(pg)
                .await?;
        }
        WarehousePool::MySql(my) => {
            sqlx::query("UPDATE sync_config SET last_sync_at = ?, updated_at = NOW() WHERE entity_type = ?")
                .bind(naive)
                .bind(entity_type)
                .execute(my)
                .await?;
        }
    }
    Ok(())
}

/// Opens a `sync_logs` row in `running` status and returns its id, so the
/// caller can close it (`complete_sync_log`/`fail_sync_log`) on every
/// terminal branch of the sync, including early returns.
#[instrument(skip(pool))]
pub async fn start_sync_log(pool: &WarehousePool, entity_type: &str, sync_type: &str) -> Result<i64> {
    let id = match pool {
        WarehousePool::PostgreSql(pg) => {
            let row: (i64,) = sqlx::query_as(
                "INSERT INTO sync_logs (entity_type, sync_type, status, started_at, created_at)
                 VALUES ($1, $2, 'running', now(), now()) RETURNING id",
            )
            .bind(entity_type)
            .bind(sync_type)
            .fetch_one(pg)
            .await?;
            row.0
        }
        WarehousePool::MySql(my) => {
            let result = sqlx::query(
                "INSERT INTO sync_logs (entity_type, sync_type, status, started_at, created_at)
                 VALUES (?, ?, 'running', NOW(), NOW())",
            )
            .bind(entity_type)
            .bind(sync_type)
            .execute(my)
            .await?;
            result.last_insert_id() as i64
        }
    };
    Ok(id)
}

pub async fn complete_sync_log(pool: &WarehousePool, id: i64, records_processed: i32, records_fetched: i32) -> Result<()> {
    match pool {
        WarehousePool::PostgreSql(pg) => {
            sqlx::query(
                "UPDATE sync_logs SET status = 'completed', records_processed = $1, records_fetched = $2, completed_at = now() WHERE id = $3",
            )
            .bind(records_processed)
            .bind(records_fetched)
            .bind(id)
            .execute(pg)
            .await?;
        }
        WarehousePool::MySql(my) => {
            sqlx::query(
                "UPDATE sync_logs SET status = 'completed', records_processed = ?, records_fetched = ?, completed_at = NOW() WHERE id = ?",
            )
            .bind(records_processed)
            .bind(records_fetched)
            .bind(id)
            .execute(my)
            .await?;
        }
    }
    Ok(())
}

pub async fn fail_sync_log(pool: &WarehousePool, id: i64, error_message: &str) -> Result<()> {
    match pool {
        WarehousePool::PostgreSql(pg) => {
            sqlx::query("UPDATE sync_logs SET status = 'failed', error_message = $1, completed_at = now() WHERE id = $2")
                .bind(error_message)
                .bind(id)
                .execute(pg)
                .await?;
        }
        WarehousePool::MySql(my) => {
            sqlx::query("UPDATE sync_logs SET status = 'failed', error_message = ?, completed_at = NOW() WHERE id = ?")
                .bind(error_message)
                .bind(id)
                .execute(my)
                .await?;
        }
    }
    Ok(())
}

const SELECT_LOG: &str =
    "SELECT id, entity_type, sync_type, status, records_processed, records_fetched, error_message FROM sync_logs";

/// Paginated `sync_logs`, optionally filtered to one entity type, newest
/// first — backs `/sync/history`.
#[instrument(skip(pool))]
pub async fn list_sync_logs(
    pool: &WarehousePool,
    entity_type: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<SyncLog>> {
    let logs = match pool {
        WarehousePool::PostgreSql(pg) => match entity_type {
            Some(entity_type) => {
                let sql = format!("{SELECT_LOG} WHERE entity_type = $1 ORDER BY id DESC LIMIT $2 OFFSET $3");
                sqlx::query_as::<_, SyncLog>(&sql)
                    .bind(entity_type)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pg)
                    .await?
            }
            None => {
                let sql = format!("{SELECT_LOG} ORDER BY id DESC LIMIT $1 OFFSET $2");
                sqlx::query_as::<_, SyncLog>(&sql).bind(limit).bind(offset).fetch_all(pg).await?
            }
        },
        WarehousePool::MySql(my) => match entity_type {
            Some(entity_type) => {
                let sql = format!("{SELECT_LOG} WHERE entity_type = ? ORDER BY id DESC LIMIT ? OFFSET ?");
                sqlx::query_as::<_, SyncLog>(&sql)
                    .bind(entity_type)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(my)
                    .await?
            }
            None => {
                let sql = format!("{SELECT_LOG} ORDER BY id DESC LIMIT ? OFFSET ?");
                sqlx::query_as::<_, SyncLog>(&sql).bind(limit).bind(offset).fetch_all(my).await?
            }
        },
    };
    Ok(logs)
}

const SELECT_STATE: &str = "SELECT entity_type, last_modified_date, last_bitrix_id, total_records FROM sync_state";

/// Every `sync_state` row — backs `/sync/stats` (row counts and last-sync
/// timestamps per entity).
pub async fn list_sync_states(pool: &WarehousePool) -> Result<Vec<SyncState>> {
    let sql = format!("{SELECT_STATE} ORDER BY entity_type");
    let states = match pool {
        WarehousePool::PostgreSql(pg) => sqlx::query_as::<_, SyncState>(&sql).fetch_all(pg).await?,
        WarehousePool::MySql(my) => sqlx::query_as::<_, SyncState>(&sql).fetch_all(my).await?,
    };
    Ok(states)
}

pub async fn get_sync_state(pool: &WarehousePool, entity_type: &str) -> Result<Option<SyncState>> {
    let state = match pool {
        WarehousePool::PostgreSql(pg) => {
            let sql = format!("{SELECT_STATE} WHERE entity_type = $1");
            sqlx::query_as::<_, SyncState>(&sql)
                .bind(entity_type)
                .fetch_optional(pg)
                .await?
        }
        WarehousePool::MySql(my) => {
            let sql = format!("{SELECT_STATE} WHERE entity_type = ?");
            sqlx::query_as::<_, SyncState>(&sql)
                .bind(entity_type)
                .fetch_optional(my)
                .await?
        }
    };
    Ok(state)
}

/// Advances the high-water mark for `entity_type` after a successful sync
/// batch. `total_records` is the running count, bumped by the caller.
#[instrument(skip(pool))]
pub async fn upsert_sync_state(
    pool: &WarehousePool,
    entity_type: &str,
    last_modified_date: Option<NaiveDateTime>,
    last_bitrix_id: Option<&str>,
    total_records: i32,
) -> Result<()> {
    match pool {
        WarehousePool::PostgreSql(pg) => {
            sqlx::query(
                "INSERT INTO sync_state (entity_type, last_modified_date, last_bitrix_id, total_records, updated_at)
                 VALUES ($1, $2, $3, $4, now())
                 ON CONFLICT (entity_type) DO UPDATE SET
                    last_modified_date = EXCLUDED.last_modified_date,
                    last_bitrix_id = EXCLUDED.last_bitrix_id,
                    total_records = EXCLUDED.total_records,
                    updated_at = now()",
            )
            .bind(entity_type)
            .bind(last_modified_date)
            .bind(last_bitrix_id)
            .bind(total_records)
            .execute(pg)
            .await?;
        }
        WarehousePool::MySql(my) => {
            sqlx::query(
                "INSERT INTO sync_state (entity_type, last_modified_date, last_bitrix_id, total_records, updated_at)
                 VALUES (?, ?, ?, ?, NOW())
                 ON DUPLICATE KEY UPDATE
                    last_modified_date = VALUES(last_modified_date),
                    last_bitrix_id = VALUES(last_bitrix_id),
                    total_records = VALUES(total_records),
                    updated_at = NOW()",
            )
            .bind(entity_type)
            .bind(last_modified_date)
            .bind(last_bitrix_id)
            .bind(total_records)
            .execute(my)
            .await?;
        }
    }
    Ok(())
}
