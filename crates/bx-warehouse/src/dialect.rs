//! Warehouse SQL dialect. Every DDL/DML statement that differs between
//! PostgreSQL and MySQL is generated through this enum rather than via a
//! trait object, since call sites already know which pool they hold.

use crate::error::{Result, WarehouseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    PostgreSql,
    MySql,
}

impl Dialect {
    pub fn from_env_value(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(Dialect::PostgreSql),
            "mysql" => Ok(Dialect::MySql),
            other => Err(WarehouseError::UnsupportedDialect(other.to_string())),
        }
    }

    /// Cross-checks the configured dialect against a `DATABASE_URL` scheme,
    /// so a mismatched config fails fast at startup instead of at the
    /// first query.
    pub fn matches_url(self, database_url: &str) -> bool {
        match self {
            Dialect::PostgreSql => {
                database_url.starts_with("postgres://") || database_url.starts_with("postgresql://")
            }
            Dialect::MySql => database_url.starts_with("mysql://"),
        }
    }

    /// The upsert clause used after `INSERT INTO tbl (...) VALUES (...)`.
    /// `updated_at` is always refreshed to the write time rather than the
    /// incoming row's value, regardless of whether it appears in
    /// `update_columns`.
    pub fn on_conflict_clause(self, conflict_columns: &[&str], update_columns: &[&str]) -> String {
        match self {
            Dialect::PostgreSql => {
                let conflict = conflict_columns.join(", ");
                let mut sets: Vec<String> = update_columns
                    .iter()
                    .filter(|c| **c != "updated_at")
                    .map(|c| format!("{c} = EXCLUDED.{c}"))
                    .collect();
                sets.push("updated_at = NOW()".to_string());
                format!("ON CONFLICT ({conflict}) DO UPDATE SET {}", sets.join(", "))
            }
            Dialect::MySql => {
                let mut sets: Vec<String> = update_columns
                    .iter()
                    .filter(|c| **c != "updated_at")
                    .map(|c| format!("{c} = VALUES({c})"))
                    .collect();
                sets.push("updated_at = NOW()".to_string());
                format!("ON DUPLICATE KEY UPDATE {}", sets.join(", "))
            }
        }
    }

    /// Bind-parameter placeholder for the nth (1-indexed) bound value.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::PostgreSql => format!("${index}"),
            Dialect::MySql => "?".to_string(),
        }
    }

    pub fn quote_identifier(self, ident: &str) -> String {
        match self {
            Dialect::PostgreSql => format!("\"{ident}\""),
            Dialect::MySql => format!("`{ident}`"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_postgresql_and_postgres_aliases() {
        assert_eq!(Dialect::from_env_value("postgresql").unwrap(), Dialect::PostgreSql);
        assert_eq!(Dialect::from_env_value("postgres").unwrap(), Dialect::PostgreSql);
    }

    #[test]
    fn rejects_unknown_dialect() {
        assert!(Dialect::from_env_value("oracle").is_err());
    }

    #[test]
    fn url_matching_catches_scheme_mismatch() {
        assert!(Dialect::PostgreSql.matches_url("postgresql://localhost/db"));
        assert!(!Dialect::PostgreSql.matches_url("mysql://localhost/db"));
        assert!(Dialect::MySql.matches_url("mysql://localhost/db"));
    }

    #[test]
    fn postgres_upsert_uses_excluded() {
        let clause = Dialect::PostgreSql.on_conflict_clause(&["bitrix_id"], &["name"]);
        assert_eq!(
            clause,
            "ON CONFLICT (bitrix_id) DO UPDATE SET name = EXCLUDED.name, updated_at = NOW()"
        );
    }

    #[test]
    fn mysql_upsert_uses_values() {
        let clause = Dialect::MySql.on_conflict_clause(&["bitrix_id"], &["name"]);
        assert_eq!(clause, "ON DUPLICATE KEY UPDATE name = VALUES(name), updated_at = NOW()");
    }

    #[test]
    fn updated_at_is_never_sourced_from_the_incoming_row() {
        let clause = Dialect::PostgreSql.on_conflict_clause(&["bitrix_id"], &["name", "updated_at"]);
        assert_eq!(clause.matches("updated_at = NOW()").count(), 1);
        assert!(!clause.contains("EXCLUDED.updated_at"));
    }
}
