//! §6.5 configuration: environment variables loaded via `clap`'s `env`
//! feature, reused here for its `Parser` derive rather than a separate
//! config crate.

use bx_warehouse::Dialect;
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "bxd", about = "bitrix-sync daemon")]
pub struct Config {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "BITRIX_WEBHOOK_URL")]
    pub bitrix_webhook_url: String,

    #[arg(long, env = "DB_DIALECT")]
    pub db_dialect: String,

    #[arg(long, env = "SYNC_BATCH_SIZE", default_value_t = 50)]
    pub sync_batch_size: u32,

    #[arg(long, env = "SYNC_DEFAULT_INTERVAL_MINUTES", default_value_t = 30)]
    pub sync_default_interval_minutes: i32,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "WEBHOOK_SHUTDOWN_GRACE_SECS", default_value_t = 30)]
    pub shutdown_grace_secs: u64,

    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Parses `DB_DIALECT` and cross-checks it against `DATABASE_URL`'s
    /// scheme, failing fast on mismatch rather than at the first query.
    pub fn dialect(&self) -> anyhow::Result<Dialect> {
        let dialect = Dialect::from_env_value(&self.db_dialect)?;
        if !dialect.matches_url(&self.database_url) {
            anyhow::bail!("DB_DIALECT={} does not match DATABASE_URL scheme", self.db_dialect);
        }
        Ok(dialect)
    }

    pub fn log_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}
