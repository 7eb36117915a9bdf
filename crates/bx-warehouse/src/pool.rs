//! Warehouse connection pool: one ceiling-15 pool (approximating the
//! original `pool_size=5` + `max_overflow=10`), pre-ping enabled, one-hour
//! connection recycle — grounded in the original `init_db()`.

use std::time::Duration;

use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::{MySqlPool, PgPool};
use tracing::info;

use crate::dialect::Dialect;
use crate::error::Result;

const MAX_CONNECTIONS: u32 = 15;
const MAX_LIFETIME: Duration = Duration::from_secs(3600);

/// A connected pool for either dialect. Call sites branch on `Dialect`
/// anyway to build dialect-specific SQL, so this is a plain enum rather
/// than a trait object.
#[derive(Clone)]
pub enum WarehousePool {
    PostgreSql(PgPool),
    MySql(MySqlPool),
}

impl WarehousePool {
    pub async fn connect(dialect: Dialect, database_url: &str) -> Result<Self> {
        info!(?dialect, "connecting to warehouse");
        match dialect {
            Dialect::PostgreSql => {
                let pool = PgPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .max_lifetime(MAX_LIFETIME)
                    .test_before_acquire(true)
                    .connect(database_url)
                    .await?;
                Ok(WarehousePool::PostgreSql(pool))
            }
            Dialect::MySql => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .max_lifetime(MAX_LIFETIME)
                    .test_before_acquire(true)
                    .connect(database_url)
                    .await?;
                Ok(WarehousePool::MySql(pool))
            }
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            WarehousePool::PostgreSql(_) => Dialect::PostgreSql,
            WarehousePool::MySql(_) => Dialect::MySql,
        }
    }

    /// Runs the embedded migrations for the admin tables (`sync_config`,
    /// `sync_logs`, `sync_state`) and the fixed reference tables. Entity
    /// tables are not migration-managed; they are created dynamically by
    /// the table builder.
    pub async fn migrate(&self) -> Result<()> {
        match self {
            WarehousePool::PostgreSql(pool) => {
                sqlx::migrate!("migrations/postgres").run(pool).await?;
            }
            WarehousePool::MySql(pool) => {
                sqlx::migrate!("migrations/mysql").run(pool).await?;
            }
        }
        info!("warehouse migrations applied");
        Ok(())
    }
}
