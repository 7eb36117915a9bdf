//! bitrix-sync daemon: wires the client, warehouse, and sync-orchestration
//! crates into a running process — webhook intake, scheduler, and the two
//! queue workers.

mod config;
mod orchestrator;
mod webhook_listener;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bx_client::BitrixClient;
use bx_sync::SyncQueue;
use bx_warehouse::WarehousePool;
use clap::Parser;
use config::Config;
use orchestrator::SyncOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    bx_core::init_tracing(config.log_json, config.log_level());

    let dialect = config.dialect().context("invalid warehouse configuration")?;
    let pool = WarehousePool::connect(dialect, &config.database_url)
        .await
        .context("failed to connect to warehouse")?;
    pool.migrate().await.context("failed to run warehouse migrations")?;

    let client = BitrixClient::new(config.bitrix_webhook_url.clone());
    let queue = Arc::new(SyncQueue::new());
    let orchestrator = Arc::new(
        SyncOrchestrator::new(client, pool, Arc::clone(&queue))
            .await
            .context("failed to build sync orchestrator")?,
    );

    orchestrator.start_scheduler().await.context("failed to start scheduler")?;

    let heavy_orchestrator = Arc::clone(&orchestrator);
    let heavy_queue = Arc::clone(&queue);
    let heavy_handle = tokio::spawn(async move {
        heavy_queue
            .run_heavy_worker(move |task| {
                let orchestrator = Arc::clone(&heavy_orchestrator);
                async move { orchestrator.run_heavy_task(task).await }
            })
            .await;
    });

    let webhook_orchestrator = Arc::clone(&orchestrator);
    let webhook_queue = Arc::clone(&queue);
    let webhook_worker_handle = tokio::spawn(async move {
        webhook_queue
            .run_webhook_worker(move |task| {
                let orchestrator = Arc::clone(&webhook_orchestrator);
                async move { orchestrator.run_webhook_task(task).await }
            })
            .await;
    });

    let listener_orchestrator = Arc::clone(&orchestrator);
    let host = config.host.clone();
    let port = config.port;
    let listener_handle = tokio::spawn(async move {
        if let Err(err) = webhook_listener::serve(&host, port, listener_orchestrator).await {
            tracing::error!(%err, "webhook listener exited");
        }
    });

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    listener_handle.abort();
    queue.stop().await;
    orchestrator.shutdown_scheduler().await.ok();

    tokio::time::timeout(Duration::from_secs(config.shutdown_grace_secs), async {
        let _ = tokio::join!(heavy_handle, webhook_worker_handle);
    })
    .await
    .ok();

    Ok(())
}
