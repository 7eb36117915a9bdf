//! Dynamic table builder: `CREATE TABLE`/`ALTER TABLE ADD COLUMN` against
//! `information_schema`, one shared template per dialect. Never drops or
//! alters an existing column — only ever adds new ones.

use bx_core::FieldInfo;
use sqlx::Row;
use tracing::{debug, info};

use crate::dialect::Dialect;
use crate::error::Result;
use crate::pool::WarehousePool;

/// Returns the existing column names for `table_name`, or an empty set if
/// the table does not exist yet.
pub async fn get_existing_columns(pool: &WarehousePool, table_name: &str) -> Result<Vec<String>> {
    match pool {
        WarehousePool::PostgreSql(pg) => {
            let rows = sqlx::query(
                "SELECT column_name FROM information_schema.columns WHERE table_name = $1",
            )
            .bind(table_name)
            .fetch_all(pg)
            .await?;
            Ok(rows.iter().map(|r| r.get::<String, _>("column_name")).collect())
        }
        WarehousePool::MySql(my) => {
            let rows = sqlx::query(
                "SELECT column_name FROM information_schema.columns WHERE table_schema = DATABASE() AND table_name = ?",
            )
            .bind(table_name)
            .fetch_all(my)
            .await?;
            Ok(rows.iter().map(|r| r.get::<String, _>("column_name")).collect())
        }
    }
}

pub async fn table_exists(pool: &WarehousePool, table_name: &str) -> Result<bool> {
    Ok(!get_existing_columns(pool, table_name).await?.is_empty())
}

/// Row count for `table_name`, or `0` if the table does not exist yet.
/// Used by the `/sync/stats` and `/references/status` admin surfaces.
pub async fn row_count(pool: &WarehousePool, table_name: &str) -> Result<i64> {
    if !table_exists(pool, table_name).await? {
        return Ok(0);
    }
    let dialect = pool.dialect();
    let quoted_table = dialect.quote_identifier(table_name);
    let sql = format!("SELECT COUNT(*) AS count FROM {quoted_table}");
    let count: i64 = match pool {
        WarehousePool::PostgreSql(pg) => sqlx::query_scalar(&sql).fetch_one(pg).await?,
        WarehousePool::MySql(my) => sqlx::query_scalar(&sql).fetch_one(my).await?,
    };
    Ok(count)
}

/// Creates `table_name` if it does not exist, with the invariant
/// `record_id`/`bitrix_id`/`created_at`/`updated_at` prefix plus one
/// column per `FieldInfo`; otherwise adds any columns from `fields` that
/// are missing, and leaves existing columns untouched.
pub async fn ensure_table(pool: &WarehousePool, table_name: &str, fields: &[FieldInfo]) -> Result<()> {
    if table_exists(pool, table_name).await? {
        let existing = get_existing_columns(pool, table_name).await?;
        for field in fields {
            if !existing.iter().any(|c| c.eq_ignore_ascii_case(&field.column_name)) {
                add_column_to_table(pool, table_name, field).await?;
            }
        }
        return Ok(());
    }

    let dialect = pool.dialect();
    let create_sql = create_table_sql(dialect, table_name, fields);
    debug!(sql = %create_sql, "creating entity table");
    exec(pool, &create_sql).await?;

    for statement in column_comment_statements(dialect, table_name, fields) {
        exec(pool, &statement).await?;
    }

    info!(table_name, columns = fields.len(), "entity table created");
    Ok(())
}

pub async fn add_column_to_table(pool: &WarehousePool, table_name: &str, field: &FieldInfo) -> Result<()> {
    let dialect = pool.dialect();
    let column = field.column_name.as_str();
    let quoted_table = dialect.quote_identifier(table_name);
    let quoted_column = dialect.quote_identifier(column);

    let alter_sql = match dialect {
        Dialect::PostgreSql => format!(
            "ALTER TABLE {quoted_table} ADD COLUMN IF NOT EXISTS {quoted_column} {}",
            field.sql_type_name
        ),
        Dialect::MySql => format!(
            "ALTER TABLE {quoted_table} ADD COLUMN {quoted_column} {}",
            field.sql_type_name
        ),
    };
    exec(pool, &alter_sql).await?;

    if let Some(statement) = column_comment_statement(dialect, table_name, field) {
        exec(pool, &statement).await?;
    }

    info!(table_name, column, "column added to entity table");
    Ok(())
}

async fn exec(pool: &WarehousePool, sql: &str) -> Result<()> {
    match pool {
        WarehousePool::PostgreSql(pg) => {
            sqlx::query(sql).execute(pg).await?;
        }
        WarehousePool::MySql(my) => {
            sqlx::query(sql).execute(my).await?;
        }
    }
    Ok(())
}

/// Column names owned by the invariant prefix every entity/reference
/// table carries; never redefined from a `FieldInfo`.
const RESERVED_COLUMNS: [&str; 4] = ["record_id", "bitrix_id", "created_at", "updated_at"];

fn invariant_prefix_columns(dialect: Dialect) -> [String; 4] {
    let record_id = match dialect {
        Dialect::PostgreSql => "record_id BIGSERIAL PRIMARY KEY".to_string(),
        Dialect::MySql => "record_id BIGINT AUTO_INCREMENT PRIMARY KEY".to_string(),
    };
    let timestamp_default = match dialect {
        Dialect::PostgreSql => "TIMESTAMP NOT NULL DEFAULT NOW()",
        Dialect::MySql => "TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP",
    };
    [
        record_id,
        "bitrix_id VARCHAR(255) NOT NULL UNIQUE".to_string(),
        format!("created_at {timestamp_default}"),
        format!("updated_at {timestamp_default}"),
    ]
}

fn create_table_sql(dialect: Dialect, table_name: &str, fields: &[FieldInfo]) -> String {
    let quoted_table = dialect.quote_identifier(table_name);
    let mut columns: Vec<String> = invariant_prefix_columns(dialect).into_iter().collect();
    for field in fields {
        if RESERVED_COLUMNS.iter().any(|r| field.column_name.eq_ignore_ascii_case(r))
            || field.column_name.eq_ignore_ascii_case("id")
        {
            continue;
        }
        let quoted_column = dialect.quote_identifier(&field.column_name);
        columns.push(format!("{quoted_column} {}", field.sql_type_name));
    }
    format!("CREATE TABLE {quoted_table} (\n    {}\n)", columns.join(",\n    "))
}

/// PostgreSQL attaches column comments via a separate `COMMENT ON COLUMN`
/// statement; MySQL inlines `COMMENT '...'` in the column definition, so
/// there is nothing further to emit there.
fn column_comment_statements(dialect: Dialect, table_name: &str, fields: &[FieldInfo]) -> Vec<String> {
    match dialect {
        Dialect::PostgreSql => fields.iter().filter_map(|f| column_comment_statement(dialect, table_name, f)).collect(),
        Dialect::MySql => Vec::new(),
    }
}

fn column_comment_statement(dialect: Dialect, table_name: &str, field: &FieldInfo) -> Option<String> {
    let description = field.description.as_ref()?;
    match dialect {
        Dialect::PostgreSql => {
            let quoted_table = dialect.quote_identifier(table_name);
            let quoted_column = dialect.quote_identifier(&field.column_name);
            let escaped = description.replace('\'', "''");
            Some(format!("COMMENT ON COLUMN {quoted_table}.{quoted_column} IS '{escaped}'"))
        }
        Dialect::MySql => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, ty: &'static str) -> FieldInfo {
        FieldInfo {
            column_name: name.to_string(),
            field_id: name.to_string(),
            sql_type_name: ty,
            description: None,
        }
    }

    #[test]
    fn create_table_sql_always_has_invariant_prefix() {
        let sql = create_table_sql(Dialect::PostgreSql, "crm_deals", &[field("TITLE", "VARCHAR(255)")]);
        assert!(sql.contains("record_id BIGSERIAL PRIMARY KEY"));
        assert!(sql.contains("bitrix_id VARCHAR(255) NOT NULL UNIQUE"));
        assert!(sql.contains("created_at TIMESTAMP NOT NULL DEFAULT NOW()"));
        assert!(sql.contains("updated_at TIMESTAMP NOT NULL DEFAULT NOW()"));
        assert!(sql.contains("\"TITLE\" VARCHAR(255)"));
    }

    #[test]
    fn create_table_sql_skips_redundant_id_column() {
        let sql = create_table_sql(Dialect::MySql, "bitrix_users", &[field("ID", "BIGINT"), field("NAME", "VARCHAR(255)")]);
        assert_eq!(sql.matches("bitrix_id").count(), 1);
        assert!(sql.contains("`NAME` VARCHAR(255)"));
    }

    #[test]
    fn create_table_sql_skips_reserved_columns_passed_as_fields() {
        let sql = create_table_sql(
            Dialect::PostgreSql,
            "crm_deals",
            &[field("CREATED_AT", "TIMESTAMP"), field("TITLE", "VARCHAR(255)")],
        );
        assert_eq!(sql.matches("created_at").count(), 1);
    }

    #[test]
    fn mysql_never_emits_standalone_comment_statements() {
        let mut f = field("TITLE", "VARCHAR(255)");
        f.description = Some("deal title".to_string());
        assert!(column_comment_statement(Dialect::MySql, "crm_deals", &f).is_none());
    }

    #[test]
    fn postgres_emits_comment_on_column_when_description_present() {
        let mut f = field("TITLE", "VARCHAR(255)");
        f.description = Some("deal's title".to_string());
        let stmt = column_comment_statement(Dialect::PostgreSql, "crm_deals", &f).unwrap();
        assert!(stmt.starts_with("COMMENT ON COLUMN \"crm_deals\".\"TITLE\" IS"));
        assert!(stmt.contains("deal''s title"));
    }
}
