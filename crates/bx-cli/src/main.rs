//! Administrative CLI for bitrix-sync operators: list/seed `sync_config`,
//! trigger a sync, and inspect recent sync activity. Talks to the same
//! `bx-warehouse`/`bx-sync` components `bxd` uses, for local/offline
//! operation without a running daemon.

use anyhow::Context;
use bx_client::BitrixClient;
use bx_core::EntityType;
use bx_sync::{EntitySyncService, ReferenceSyncService};
use bx_warehouse::WarehousePool;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bx", about = "bitrix-sync administrative CLI")]
struct Cli {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "BITRIX_WEBHOOK_URL")]
    bitrix_webhook_url: String,

    #[arg(long, env = "DB_DIALECT")]
    db_dialect: String,

    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    log_json: bool,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Inspect or seed `sync_config` rows.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Trigger an entity sync synchronously.
    Sync {
        /// Entity type, e.g. "deal", "contact", "user".
        entity: String,
        /// Force a full sync even if a sync_state row exists.
        #[arg(long)]
        full: bool,
    },
    /// Sync reference/dictionary tables.
    Reference {
        #[command(subcommand)]
        action: ReferenceAction,
    },
    /// Recent sync activity: running tasks and the last few log entries
    /// per entity type.
    Status,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// List every configured entity type.
    List,
    /// Insert a default-enabled row for every known entity type that is
    /// not already configured.
    Seed {
        #[arg(long, default_value_t = 30)]
        interval_minutes: i32,
    },
    /// Upsert one entity type's configuration.
    Set {
        #[arg(long)]
        entity: String,
        #[arg(long)]
        enabled: bool,
        #[arg(long, default_value_t = 30)]
        interval_minutes: i32,
        #[arg(long)]
        webhook_enabled: bool,
    },
}

#[derive(Debug, Subcommand)]
enum ReferenceAction {
    /// Sync one registered reference type by name.
    Sync { name: String },
    /// Sync every registered reference type.
    SyncAll,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_level = cli.log_level.parse().unwrap_or(tracing::Level::INFO);
    bx_core::init_tracing(cli.log_json, log_level);

    let dialect = bx_warehouse::Dialect::from_env_value(&cli.db_dialect).context("invalid DB_DIALECT")?;
    if !dialect.matches_url(&cli.database_url) {
        anyhow::bail!("DB_DIALECT={} does not match DATABASE_URL scheme", cli.db_dialect);
    }
    let pool = WarehousePool::connect(dialect, &cli.database_url)
        .await
        .context("failed to connect to warehouse")?;
    let client = BitrixClient::new(cli.bitrix_webhook_url.clone());

    match cli.command {
        Command::Config { action } => run_config(&pool, action).await?,
        Command::Sync { entity, full } => run_sync(&client, &pool, &entity, full).await?,
        Command::Reference { action } => run_reference(&client, &pool, action).await?,
        Command::Status => run_status(&pool).await?,
    }

    Ok(())
}

async fn run_config(pool: &WarehousePool, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::List => {
            let configs = bx_warehouse::config_store::list_sync_configs(pool).await?;
            for config in configs {
                println!(
                    "{:<20} enabled={:<5} interval={:<4}m webhook={:<5} last_sync={:?}",
                    config.entity_type, config.enabled, config.sync_interval_minutes, config.webhook_enabled, config.last_sync_at
                );
            }
        }
        ConfigAction::Seed { interval_minutes } => {
            for entity_type in EntityType::ALL {
                bx_warehouse::config_store::upsert_sync_config(pool, entity_type.as_str(), true, interval_minutes, true).await?;
                println!("seeded {}", entity_type.as_str());
            }
        }
        ConfigAction::Set { entity, enabled, interval_minutes, webhook_enabled } => {
            bx_warehouse::config_store::upsert_sync_config(pool, &entity, enabled, interval_minutes, webhook_enabled).await?;
            println!("updated {entity}");
        }
    }
    Ok(())
}

async fn run_sync(client: &BitrixClient, pool: &WarehousePool, entity: &str, full: bool) -> anyhow::Result<()> {
    let entity_type = EntityType::from_str(entity).with_context(|| format!("unknown entity type: {entity}"))?;
    let service = EntitySyncService::new(client, pool);

    let outcome = if full {
        service.run_full(entity_type, serde_json::Value::Null).await?
    } else {
        service.run_incremental(entity_type).await?
    };

    println!("fetched={} processed={}", outcome.records_fetched, outcome.records_processed);
    Ok(())
}

async fn run_reference(client: &BitrixClient, pool: &WarehousePool, action: ReferenceAction) -> anyhow::Result<()> {
    let service = ReferenceSyncService::new(client, pool);
    match action {
        ReferenceAction::Sync { name } => {
            let processed = service.sync_one(&name).await?;
            println!("{name}: processed {processed} rows");
        }
        ReferenceAction::SyncAll => {
            let processed = service.sync_all().await?;
            println!("all references: processed {processed} rows");
        }
    }
    Ok(())
}

async fn run_status(pool: &WarehousePool) -> anyhow::Result<()> {
    let running = bx_warehouse::config_store::list_sync_logs(pool, None, 20, 0)
        .await?
        .into_iter()
        .filter(|log| log.status == "running")
        .collect::<Vec<_>>();

    if running.is_empty() {
        println!("no syncs currently running");
    } else {
        for log in &running {
            println!("running: {} ({})", log.entity_type, log.sync_type);
        }
    }

    let recent = bx_warehouse::config_store::list_sync_logs(pool, None, 10, 0).await?;
    println!("\nrecent history:");
    for log in recent {
        println!(
            "{:<6} {:<20} {:<12} status={:<10} processed={:?} error={:?}",
            log.id, log.entity_type, log.sync_type, log.status, log.records_processed, log.error_message
        );
    }
    Ok(())
}
