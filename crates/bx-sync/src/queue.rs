//! Sync queue: a heavy serial channel (priority-ordered, one worker) plus
//! a bounded-parallel webhook channel, with dedup on `task_type:entity_type`.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex, Notify, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

/// Priority ladder: webhooks `0` < manual `10` < reference `20` < scheduled `30`.
pub const PRIORITY_WEBHOOK: i32 = 0;
pub const PRIORITY_MANUAL: i32 = 10;
pub const PRIORITY_REFERENCE: i32 = 20;
pub const PRIORITY_SCHEDULED: i32 = 30;

const WEBHOOK_CONCURRENCY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Full,
    Incremental,
    Webhook,
    WebhookDelete,
    Reference,
    ReferenceAll,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Full => "full",
            TaskType::Incremental => "incremental",
            TaskType::Webhook => "webhook",
            TaskType::WebhookDelete => "webhook_delete",
            TaskType::Reference => "reference",
            TaskType::ReferenceAll => "reference_all",
        }
    }

    fn is_webhook(self) -> bool {
        matches!(self, TaskType::Webhook | TaskType::WebhookDelete)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTask {
    pub task_id: Uuid,
    pub priority: i32,
    pub task_type: TaskType,
    pub entity_type: String,
    pub sync_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl SyncTask {
    pub fn new(task_type: TaskType, entity_type: impl Into<String>, priority: i32, payload: Value) -> Self {
        let entity_type = entity_type.into();
        SyncTask {
            task_id: Uuid::new_v4(),
            priority,
            sync_type: task_type.as_str().to_string(),
            task_type,
            entity_type,
            payload,
            created_at: Utc::now(),
        }
    }

    /// Deduplication key = `task_type:entity_type`.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.task_type.as_str(), self.entity_type)
    }
}

impl PartialEq for SyncTask {
    fn eq(&self, other: &Self) -> bool {
        self.task_id == other.task_id
    }
}
impl Eq for SyncTask {}

/// Lower numeric priority sorts ahead in the heavy channel; `BinaryHeap`
/// is a max-heap so ordering is inverted, then broken by insertion order
/// (older task first) via `created_at`.
impl Ord for SyncTask {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.created_at.cmp(&self.created_at))
    }
}
impl PartialOrd for SyncTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    AlreadyRunning,
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct EnqueueResult {
    pub outcome: EnqueueOutcome,
    pub task_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct QueueStatus {
    pub running: bool,
    pub heavy_queue_size: usize,
    pub current_heavy_task: Option<SyncTask>,
    pub pending_heavy_keys: Vec<String>,
}

/// The two-channel priority queue described in §4.H. Heavy tasks are
/// pushed onto a shared `BinaryHeap` guarded by a `Mutex` and woken via
/// `Notify`; webhook tasks flow through an unbounded `mpsc` channel
/// drained by a worker bounded to [`WEBHOOK_CONCURRENCY`] concurrent
/// executions via a semaphore.
pub struct SyncQueue {
    heavy: Arc<Mutex<BinaryHeap<SyncTask>>>,
    heavy_notify: Arc<Notify>,
    current_heavy_task: Arc<Mutex<Option<SyncTask>>>,
    pending_heavy_keys: Arc<Mutex<HashSet<String>>>,
    webhook_tx: mpsc::UnboundedSender<SyncTask>,
    webhook_rx: Mutex<Option<mpsc::UnboundedReceiver<SyncTask>>>,
    webhook_semaphore: Arc<Semaphore>,
    running: Arc<Mutex<bool>>,
}

impl SyncQueue {
    pub fn new() -> Self {
        let (webhook_tx, webhook_rx) = mpsc::unbounded_channel();
        SyncQueue {
            heavy: Arc::new(Mutex::new(BinaryHeap::new())),
            heavy_notify: Arc::new(Notify::new()),
            current_heavy_task: Arc::new(Mutex::new(None)),
            pending_heavy_keys: Arc::new(Mutex::new(HashSet::new())),
            webhook_tx,
            webhook_rx: Mutex::new(Some(webhook_rx)),
            webhook_semaphore: Arc::new(Semaphore::new(WEBHOOK_CONCURRENCY)),
            running: Arc::new(Mutex::new(true)),
        }
    }

    /// §4.H `Enqueue`. Webhooks never dedup; heavy tasks dedup against the
    /// task currently executing and the pending heavy set.
    pub async fn enqueue(&self, task: SyncTask) -> EnqueueResult {
        if task.task_type.is_webhook() {
            let task_id = task.task_id;
            self.webhook_tx.send(task).ok();
            return EnqueueResult { outcome: EnqueueOutcome::Queued, task_id };
        }

        let dedup_key = task.dedup_key();

        if let Some(current) = self.current_heavy_task.lock().await.as_ref() {
            if current.dedup_key() == dedup_key {
                return EnqueueResult { outcome: EnqueueOutcome::AlreadyRunning, task_id: current.task_id };
            }
        }

        let mut pending = self.pending_heavy_keys.lock().await;
        if pending.contains(&dedup_key) {
            let heavy = self.heavy.lock().await;
            let existing = heavy.iter().find(|t| t.dedup_key() == dedup_key).map(|t| t.task_id);
            drop(heavy);
            return EnqueueResult {
                outcome: EnqueueOutcome::Duplicate,
                task_id: existing.unwrap_or(task.task_id),
            };
        }

        pending.insert(dedup_key);
        drop(pending);

        let task_id = task.task_id;
        self.heavy.lock().await.push(task);
        self.heavy_notify.notify_one();
        EnqueueResult { outcome: EnqueueOutcome::Queued, task_id }
    }

    /// §4.H `Status`.
    pub async fn status(&self) -> QueueStatus {
        QueueStatus {
            running: *self.running.lock().await,
            heavy_queue_size: self.heavy.lock().await.len(),
            current_heavy_task: self.current_heavy_task.lock().await.clone(),
            pending_heavy_keys: self.pending_heavy_keys.lock().await.iter().cloned().collect(),
        }
    }

    /// Pops the highest-priority heavy task, marking it as current for the
    /// duration of `handler`'s execution and clearing the dedup entry once
    /// popped (a task may be re-enqueued with the same key as soon as it
    /// starts running).
    pub async fn run_heavy_worker<F, Fut>(&self, handler: F)
    where
        F: Fn(SyncTask) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        loop {
            if !*self.running.lock().await {
                break;
            }

            let task = {
                let mut heap = self.heavy.lock().await;
                heap.pop()
            };

            let Some(task) = task else {
                self.heavy_notify.notified().await;
                continue;
            };

            self.pending_heavy_keys.lock().await.remove(&task.dedup_key());
            *self.current_heavy_task.lock().await = Some(task.clone());

            info!(task_id = %task.task_id, task_type = task.task_type.as_str(), entity_type = %task.entity_type, "dispatching heavy task");
            handler(task).await;

            *self.current_heavy_task.lock().await = None;
        }
    }

    /// Drains the webhook channel, spawning up to [`WEBHOOK_CONCURRENCY`]
    /// concurrent task executions via the semaphore.
    pub async fn run_webhook_worker<F, Fut>(&self, handler: F)
    where
        F: Fn(SyncTask) -> Fut + Send + Sync + 'static + Clone,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut rx = match self.webhook_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                warn!("webhook worker already started");
                return;
            }
        };

        while let Some(task) = rx.recv().await {
            let permit = self.webhook_semaphore.clone().acquire_owned().await;
            let Ok(permit) = permit else { break };
            let handler = handler.clone();
            tokio::spawn(async move {
                let _permit = permit;
                handler(task).await;
            });
        }
    }

    /// Stops accepting new work. In-flight tasks are left to the caller to
    /// await (the daemon awaits its worker join handles up to the grace
    /// period before exiting).
    pub async fn stop(&self) {
        *self.running.lock().await = false;
        self.heavy_notify.notify_one();
    }
}

impl Default for SyncQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(task_type: TaskType, entity_type: &str, priority: i32) -> SyncTask {
        SyncTask::new(task_type, entity_type, priority, json!({}))
    }

    #[test]
    fn dedup_key_combines_type_and_entity() {
        let t = task(TaskType::Full, "deal", PRIORITY_MANUAL);
        assert_eq!(t.dedup_key(), "full:deal");
    }

    #[tokio::test]
    async fn webhooks_never_dedup() {
        let queue = SyncQueue::new();
        let first = queue.enqueue(task(TaskType::Webhook, "deal", PRIORITY_WEBHOOK)).await;
        let second = queue.enqueue(task(TaskType::Webhook, "deal", PRIORITY_WEBHOOK)).await;
        assert_eq!(first.outcome, EnqueueOutcome::Queued);
        assert_eq!(second.outcome, EnqueueOutcome::Queued);
    }

    #[tokio::test]
    async fn duplicate_heavy_task_is_rejected() {
        let queue = SyncQueue::new();
        let first = queue.enqueue(task(TaskType::Incremental, "deal", PRIORITY_SCHEDULED)).await;
        let second = queue.enqueue(task(TaskType::Incremental, "deal", PRIORITY_SCHEDULED)).await;
        assert_eq!(first.outcome, EnqueueOutcome::Queued);
        assert_eq!(second.outcome, EnqueueOutcome::Duplicate);
        assert_eq!(second.task_id, first.task_id);
    }

    #[tokio::test]
    async fn already_running_heavy_task_is_reported() {
        let queue = SyncQueue::new();
        let enqueued = queue.enqueue(task(TaskType::Full, "contact", PRIORITY_MANUAL)).await;
        *queue.current_heavy_task.lock().await = queue.heavy.lock().await.pop();
        queue.pending_heavy_keys.lock().await.remove("full:contact");

        let again = queue.enqueue(task(TaskType::Full, "contact", PRIORITY_MANUAL)).await;
        assert_eq!(again.outcome, EnqueueOutcome::AlreadyRunning);
        assert_eq!(again.task_id, enqueued.task_id);
    }

    #[tokio::test]
    async fn heavy_queue_pops_lowest_priority_number_first() {
        let queue = SyncQueue::new();
        queue.enqueue(task(TaskType::Incremental, "lead", PRIORITY_SCHEDULED)).await;
        queue.enqueue(task(TaskType::Incremental, "deal", PRIORITY_WEBHOOK)).await;
        queue.enqueue(task(TaskType::Incremental, "contact", PRIORITY_REFERENCE)).await;

        let mut heap = queue.heavy.lock().await;
        let popped = heap.pop().unwrap();
        assert_eq!(popped.entity_type, "deal");
    }

    #[tokio::test]
    async fn status_reports_pending_keys() {
        let queue = SyncQueue::new();
        queue.enqueue(task(TaskType::Full, "deal", PRIORITY_MANUAL)).await;
        let status = queue.status().await;
        assert_eq!(status.heavy_queue_size, 1);
        assert_eq!(status.pending_heavy_keys, vec!["full:deal".to_string()]);
    }
}
