//! bx-sync: sync orchestration for the Bitrix24 replication pipeline.
//!
//! Ties `bx-client` and `bx-warehouse` together: entity and reference sync
//! services, the two-channel priority queue, the cron scheduler, and the
//! webhook parser/dispatcher. Building blocks only — the daemon and CLI
//! binaries wire these into a running process.

pub mod entity_sync;
pub mod queue;
pub mod reference_sync;
pub mod result;
pub mod scheduler;
pub mod webhook;

pub use entity_sync::{EntitySyncService, SyncOutcome, WebhookOutcome};
pub use queue::{EnqueueOutcome, EnqueueResult, QueueStatus, SyncQueue, SyncTask, TaskType};
pub use queue::{PRIORITY_MANUAL, PRIORITY_REFERENCE, PRIORITY_SCHEDULED, PRIORITY_WEBHOOK};
pub use reference_sync::ReferenceSyncService;
pub use result::Result;
pub use scheduler::Scheduler;
pub use webhook::{dispatch as dispatch_webhook, parse_event as parse_webhook_event, parse_nested_query, WebhookEvent};
