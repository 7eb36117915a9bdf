//! `SyncOrchestrator`: the in-process equivalent of the §6.3 administrative
//! surface. An external HTTP layer is out of scope (§1), so these are
//! plain async methods a caller — `bxd`'s webhook listener, or `bx-cli` —
//! invokes directly.

use std::sync::Arc;

use bx_client::BitrixClient;
use bx_core::{EntityType, SyncError};
use bx_sync::{
    dispatch_webhook, parse_webhook_event, EnqueueResult, EntitySyncService, QueueStatus,
    ReferenceSyncService, Scheduler, SyncQueue, SyncTask, TaskType,
};
use bx_sync::{PRIORITY_MANUAL, PRIORITY_REFERENCE};
use bx_warehouse::config_store::{SyncConfig, SyncLog, SyncState};
use bx_warehouse::WarehousePool;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

/// The 12 webhook events the daemon registers/unregisters in bulk.
pub const KNOWN_WEBHOOK_EVENTS: &[&str] = &[
    "ONCRMDEALADD", "ONCRMDEALUPDATE", "ONCRMDEALDELETE",
    "ONCRMCONTACTADD", "ONCRMCONTACTUPDATE", "ONCRMCONTACTDELETE",
    "ONCRMLEADADD", "ONCRMLEADUPDATE", "ONCRMLEADDELETE",
    "ONCRMCOMPANYADD", "ONCRMCOMPANYUPDATE", "ONCRMCOMPANYDELETE",
];

#[derive(Debug, Clone, Serialize)]
pub struct EntityStat {
    pub entity_type: String,
    pub row_count: i64,
    pub last_sync_at: Option<chrono::NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceStat {
    pub name: String,
    pub row_count: i64,
}

pub struct SyncOrchestrator {
    client: BitrixClient,
    pool: WarehousePool,
    queue: Arc<SyncQueue>,
    scheduler: Mutex<Scheduler>,
}

impl SyncOrchestrator {
    pub async fn new(client: BitrixClient, pool: WarehousePool, queue: Arc<SyncQueue>) -> bx_sync::Result<Self> {
        let scheduler = Scheduler::new(Arc::clone(&queue)).await?;
        Ok(SyncOrchestrator { client, pool, queue, scheduler: Mutex::new(scheduler) })
    }

    pub async fn start_scheduler(&self) -> bx_sync::Result<()> {
        self.scheduler.lock().await.load_from_config(&self.pool).await?;
        self.scheduler.lock().await.start().await
    }

    pub async fn shutdown_scheduler(&self) -> bx_sync::Result<()> {
        self.scheduler.lock().await.shutdown().await
    }

    /// `GET /sync/config`
    pub async fn list_sync_config(&self) -> bx_sync::Result<Vec<SyncConfig>> {
        bx_warehouse::config_store::list_sync_configs(&self.pool)
            .await
            .map_err(|e| SyncError::database("admin", e))
    }

    /// `PUT /sync/config` — upserts the row, then reschedules (or removes)
    /// the corresponding cron job.
    pub async fn upsert_sync_config(
        &self,
        entity_type: &str,
        enabled: bool,
        sync_interval_minutes: i32,
        webhook_enabled: bool,
    ) -> bx_sync::Result<()> {
        bx_warehouse::config_store::upsert_sync_config(&self.pool, entity_type, enabled, sync_interval_minutes, webhook_enabled)
            .await
            .map_err(|e| SyncError::database(entity_type, e))?;

        if enabled {
            self.scheduler.lock().await.register_job(entity_type, sync_interval_minutes).await?;
        } else {
            self.scheduler.lock().await.remove_job(entity_type).await;
        }
        Ok(())
    }

    /// `POST /sync/start/{entity}` — enqueues a full sync if no
    /// `sync_state` row exists yet, otherwise an incremental one.
    #[instrument(skip(self))]
    pub async fn start_sync(&self, entity_type: &str) -> bx_sync::Result<EnqueueResult> {
        if EntityType::from_str(entity_type).is_none() {
            return Err(SyncError::Config { message: format!("unknown entity type: {entity_type}") });
        }
        let has_state = bx_warehouse::config_store::get_sync_state(&self.pool, entity_type)
            .await
            .map_err(|e| SyncError::database(entity_type, e))?
            .is_some();

        let task_type = if has_state { TaskType::Incremental } else { TaskType::Full };
        let task = SyncTask::new(task_type, entity_type, PRIORITY_MANUAL, json!({}));
        Ok(self.queue.enqueue(task).await)
    }

    /// `GET /sync/status`
    pub async fn status(&self) -> QueueStatus {
        self.queue.status().await
    }

    /// `GET /sync/history`
    pub async fn history(&self, entity_type: Option<&str>, limit: i64, offset: i64) -> bx_sync::Result<Vec<SyncLog>> {
        bx_warehouse::config_store::list_sync_logs(&self.pool, entity_type, limit, offset)
            .await
            .map_err(|e| SyncError::database(entity_type.unwrap_or("all"), e))
    }

    /// `GET /sync/stats`
    pub async fn stats(&self) -> bx_sync::Result<Vec<EntityStat>> {
        let states: Vec<SyncState> = bx_warehouse::config_store::list_sync_states(&self.pool)
            .await
            .map_err(|e| SyncError::database("admin", e))?;

        let mut stats = Vec::with_capacity(states.len());
        for entity_type in EntityType::ALL {
            let row_count = bx_warehouse::table_builder::row_count(&self.pool, entity_type.table_name())
                .await
                .map_err(|e| SyncError::database(entity_type.as_str(), e))?;
            let last_sync_at = states
                .iter()
                .find(|s| s.entity_type == entity_type.as_str())
                .and_then(|s| s.last_modified_date);
            stats.push(EntityStat { entity_type: entity_type.as_str().to_string(), row_count, last_sync_at });
        }
        Ok(stats)
    }

    /// `POST /references/sync/{name}`
    pub async fn sync_reference(&self, name: &str) -> EnqueueResult {
        let task = SyncTask::new(TaskType::Reference, name, PRIORITY_REFERENCE, json!({}));
        self.queue.enqueue(task).await
    }

    /// `POST /references/sync-all`
    pub async fn sync_reference_all(&self) -> EnqueueResult {
        let task = SyncTask::new(TaskType::ReferenceAll, "all", PRIORITY_REFERENCE, json!({}));
        self.queue.enqueue(task).await
    }

    /// `GET /references/status`
    pub async fn reference_status(&self) -> bx_sync::Result<Vec<ReferenceStat>> {
        let mut stats = Vec::new();
        for reference_type in bx_core::REFERENCE_TYPES {
            let row_count = bx_warehouse::table_builder::row_count(&self.pool, reference_type.table_name)
                .await
                .map_err(|e| SyncError::database(reference_type.name, e))?;
            stats.push(ReferenceStat { name: reference_type.name.to_string(), row_count });
        }
        Ok(stats)
    }

    /// `POST /webhooks/bitrix` (§6.2). Parses and dispatches the event,
    /// returning the `{status: accepted}` payload immediately regardless
    /// of the later async sync outcome.
    pub async fn webhook_intake(&self, body: &str) -> serde_json::Value {
        let Some(event) = parse_webhook_event(body) else {
            return json!({ "status": "ignored", "reason": "unsupported_event" });
        };
        let response = json!({ "status": "accepted", "event": event.event, "entity_id": event.bitrix_id });
        dispatch_webhook(&self.queue, event).await;
        response
    }

    /// `POST /webhooks/register`
    pub async fn register_webhooks(&self, handler_url: &str) -> bx_sync::Result<()> {
        for event in KNOWN_WEBHOOK_EVENTS {
            self.client
                .register_webhook(event, handler_url)
                .await
                .map_err(|e| SyncError::bitrix("webhook", e))?;
        }
        info!(count = KNOWN_WEBHOOK_EVENTS.len(), "webhooks registered");
        Ok(())
    }

    /// `DELETE /webhooks/unregister`
    pub async fn unregister_webhooks(&self, handler_url: &str) -> bx_sync::Result<()> {
        for event in KNOWN_WEBHOOK_EVENTS {
            self.client
                .unregister_webhook(event, handler_url)
                .await
                .map_err(|e| SyncError::bitrix("webhook", e))?;
        }
        Ok(())
    }

    /// Handler passed to [`SyncQueue::run_heavy_worker`]: dispatches a
    /// popped task to the matching sync service.
    pub async fn run_heavy_task(&self, task: SyncTask) {
        let result = match task.task_type {
            TaskType::Full => self.run_entity_sync(&task, true).await,
            TaskType::Incremental => self.run_entity_sync(&task, false).await,
            TaskType::Reference => ReferenceSyncService::new(&self.client, &self.pool)
                .sync_one(&task.entity_type)
                .await
                .map(|_| ()),
            TaskType::ReferenceAll => ReferenceSyncService::new(&self.client, &self.pool)
                .sync_all()
                .await
                .map(|_| ()),
            TaskType::Webhook | TaskType::WebhookDelete => {
                error!(task_id = %task.task_id, "webhook task reached the heavy worker");
                Ok(())
            }
        };

        if let Err(err) = result {
            error!(task_id = %task.task_id, entity_type = %task.entity_type, task_type = task.task_type.as_str(), %err, "sync task failed");
        }
    }

    /// Handler passed to [`SyncQueue::run_webhook_worker`].
    pub async fn run_webhook_task(&self, task: SyncTask) {
        let Some(entity_type) = EntityType::from_str(&task.entity_type) else {
            error!(entity_type = %task.entity_type, "webhook task for unknown entity type");
            return;
        };
        let Some(bitrix_id) = task.payload.get("bitrix_id").and_then(|v| v.as_str()) else {
            error!(task_id = %task.task_id, "webhook task missing bitrix_id");
            return;
        };

        let service = EntitySyncService::new(&self.client, &self.pool);
        let result = if task.task_type == TaskType::WebhookDelete {
            service.delete_entity_by_id(entity_type, bitrix_id).await.map(|_| ())
        } else {
            service.sync_entity_by_id(entity_type, bitrix_id).await.map(|_| ())
        };

        if let Err(err) = result {
            error!(task_id = %task.task_id, entity_type = %task.entity_type, %err, "webhook sync failed");
        }
    }

    async fn run_entity_sync(&self, task: &SyncTask, full: bool) -> bx_sync::Result<()> {
        let entity_type = EntityType::from_str(&task.entity_type)
            .ok_or_else(|| SyncError::Config { message: format!("unknown entity type: {}", task.entity_type) })?;
        let service = EntitySyncService::new(&self.client, &self.pool);
        if full {
            service.run_full(entity_type, serde_json::Value::Null).await.map(|_| ())
        } else {
            service.run_incremental(entity_type).await.map(|_| ())
        }
    }
}
