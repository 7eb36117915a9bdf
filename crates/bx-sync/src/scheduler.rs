//! Scheduler: translates enabled `sync_config` rows into periodic
//! incremental-sync enqueue operations, one `tokio-cron-scheduler` job per
//! entity type.

use std::collections::HashMap;
use std::sync::Arc;

use bx_warehouse::WarehousePool;
use serde_json::json;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

use crate::queue::{SyncTask, SyncQueue, TaskType, PRIORITY_SCHEDULED};
use crate::result::Result;

/// Wraps a `JobScheduler` plus the entity-type -> job-id map needed to
/// reschedule or remove a job when `sync_config` changes.
pub struct Scheduler {
    inner: JobScheduler,
    jobs: Arc<tokio::sync::Mutex<HashMap<String, Uuid>>>,
    queue: Arc<SyncQueue>,
}

impl Scheduler {
    pub async fn new(queue: Arc<SyncQueue>) -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .map_err(|e| bx_core::SyncError::Config { message: e.to_string() })?;
        Ok(Scheduler { inner, jobs: Arc::new(tokio::sync::Mutex::new(HashMap::new())), queue })
    }

    /// §4.I startup: reads every enabled `sync_config` row and registers a
    /// job firing every `sync_interval_minutes` minutes.
    pub async fn load_from_config(&self, pool: &WarehousePool) -> Result<()> {
        let configs = bx_warehouse::config_store::list_sync_configs(pool)
            .await
            .map_err(|e| bx_core::SyncError::database("scheduler", e))?;

        for config in configs {
            if config.enabled {
                self.register_job(&config.entity_type, config.sync_interval_minutes).await?;
            }
        }
        Ok(())
    }

    /// Registers (or replaces) the periodic job for `entity_type`.
    /// `tokio-cron-scheduler` coalesces missed firings and never overlaps
    /// a job with itself, which together with the queue's dedup covers
    /// the `max_instances=1` + `coalesce` semantics named in §4.I.
    pub async fn register_job(&self, entity_type: &str, interval_minutes: i32) -> Result<()> {
        self.remove_job(entity_type).await;

        let cron = every_n_minutes_cron(interval_minutes.max(1) as u32);
        let queue = Arc::clone(&self.queue);
        let entity_type_owned = entity_type.to_string();

        let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let queue = Arc::clone(&queue);
            let entity_type = entity_type_owned.clone();
            Box::pin(async move {
                let task = SyncTask::new(TaskType::Incremental, entity_type.clone(), PRIORITY_SCHEDULED, json!({}));
                info!(entity_type, "scheduler enqueuing incremental sync");
                queue.enqueue(task).await;
            })
        })
        .map_err(|e| bx_core::SyncError::Config { message: e.to_string() })?;

        let job_id = self
            .inner
            .add(job)
            .await
            .map_err(|e| bx_core::SyncError::Config { message: e.to_string() })?;

        self.jobs.lock().await.insert(entity_type.to_string(), job_id);
        Ok(())
    }

    /// On config mutation: removes the job for `entity_type`, if any.
    pub async fn remove_job(&self, entity_type: &str) {
        if let Some(job_id) = self.jobs.lock().await.remove(entity_type) {
            if let Err(err) = self.inner.remove(&job_id).await {
                warn!(entity_type, %err, "failed to remove scheduler job");
            }
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        self.inner
            .start()
            .await
            .map_err(|e| bx_core::SyncError::Config { message: e.to_string() })
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| bx_core::SyncError::Config { message: e.to_string() })
    }
}

/// Translates a whole-minute interval into a six-field cron expression
/// (`tokio-cron-scheduler` requires seconds). UTC, no DST handling.
fn every_n_minutes_cron(interval_minutes: u32) -> String {
    format!("0 0/{interval_minutes} * * * *")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_expression_uses_every_n_minutes_syntax() {
        assert_eq!(every_n_minutes_cron(30), "0 0/30 * * * *");
        assert_eq!(every_n_minutes_cron(5), "0 0/5 * * * *");
    }

    #[test]
    fn zero_interval_is_not_possible_since_callers_clamp_to_one() {
        assert_eq!(every_n_minutes_cron(1), "0 0/1 * * * *");
    }
}
