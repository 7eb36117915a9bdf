//! Upsert writer: coerces raw Bitrix field values to the live column type
//! and writes them with a dialect-appropriate `INSERT ... ON CONFLICT`/
//! `ON DUPLICATE KEY UPDATE` statement.

use std::collections::BTreeMap;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use tracing::debug;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::pool::WarehousePool;

/// The bind type a `Null` coercion should use, so a missing/unparseable
/// value still binds against the column's real SQL type instead of
/// defaulting to text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Decimal,
    Boolean,
    Timestamp,
}

/// A value coerced to its target column type, ready to bind.
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Null(ColumnKind),
    Text(String),
    Integer(i64),
    Decimal(BigDecimal),
    Boolean(bool),
    Timestamp(NaiveDateTime),
}

/// Coerces a raw JSON value to the type implied by `column_type` (one of
/// the SQL type names [`bx_core::FieldInfo`] emits: `VARCHAR`-prefixed,
/// `TEXT`, `BIGINT`, `FLOAT`, `TIMESTAMP`, `BOOLEAN`).
pub fn coerce_value(raw: &Value, column_type: &str) -> CoercedValue {
    let upper = column_type.to_ascii_uppercase();

    if upper.starts_with("BIGINT") || upper.starts_with("INT") {
        if raw.is_null() {
            return CoercedValue::Null(ColumnKind::Integer);
        }
        return raw
            .as_i64()
            .or_else(|| raw.as_str().and_then(|s| s.parse::<i64>().ok()))
            .map(CoercedValue::Integer)
            .unwrap_or(CoercedValue::Null(ColumnKind::Integer));
    }
    if upper.starts_with("FLOAT") || upper.starts_with("DOUBLE") || upper.starts_with("DECIMAL") {
        if raw.is_null() {
            return CoercedValue::Null(ColumnKind::Decimal);
        }
        let text = raw.as_str().map(str::to_string).unwrap_or_else(|| raw.to_string());
        return BigDecimal::from_str(text.trim())
            .map(CoercedValue::Decimal)
            .unwrap_or(CoercedValue::Null(ColumnKind::Decimal));
    }
    if upper.starts_with("BOOLEAN") || upper.starts_with("BOOL") {
        if let Some(b) = raw.as_bool() {
            return CoercedValue::Boolean(b);
        }
        return match raw.as_str() {
            Some("Y") | Some("y") | Some("1") | Some("true") => CoercedValue::Boolean(true),
            Some("N") | Some("n") | Some("0") | Some("false") => CoercedValue::Boolean(false),
            _ => CoercedValue::Null(ColumnKind::Boolean),
        };
    }
    if upper.starts_with("TIMESTAMP") || upper.starts_with("DATE") {
        let text = match raw.as_str() {
            Some(s) => s.to_string(),
            None => return CoercedValue::Null(ColumnKind::Timestamp),
        };
        return parse_timestamp(&text)
            .map(CoercedValue::Timestamp)
            .unwrap_or(CoercedValue::Null(ColumnKind::Timestamp));
    }

    // TEXT / VARCHAR / unknown: stringify scalars, pass through already-string values.
    if raw.is_null() {
        return CoercedValue::Null(ColumnKind::Text);
    }
    match raw {
        Value::String(s) => CoercedValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => CoercedValue::Text(raw.to_string()),
        other => CoercedValue::Text(other.to_string()),
    }
}

/// Parses an ISO-8601 timestamp, tolerating a bare trailing `Z` (Bitrix
/// emits both `+03:00`-style offsets and bare `Z`), and normalizes to UTC.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    if raw.ends_with('Z') {
        let rewritten = format!("{}+00:00", &raw[..raw.len() - 1]);
        if let Ok(dt) = DateTime::parse_from_rfc3339(&rewritten) {
            return Some(dt.with_timezone(&Utc).naive_utc());
        }
    }
    None
}

/// Builds an `INSERT ... ON CONFLICT`/`ON DUPLICATE KEY UPDATE` statement
/// for one record, keyed by `bitrix_id` for entity tables or by a
/// composite natural key for reference/dictionary tables. `updated_at`, if
/// present in `columns`, is still bound on insert but is always refreshed
/// to the write time on conflict rather than the incoming row's value.
pub fn build_upsert_sql(dialect: Dialect, table_name: &str, key_columns: &[&str], columns: &[String]) -> String {
    let quoted_table = dialect.quote_identifier(table_name);
    let quoted_columns: Vec<String> = columns.iter().map(|c| dialect.quote_identifier(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| dialect.placeholder(i)).collect();
    let update_columns: Vec<&str> = columns
        .iter()
        .map(String::as_str)
        .filter(|c| !key_columns.contains(c) && *c != "updated_at")
        .collect();

    let conflict_clause = dialect.on_conflict_clause(key_columns, &update_columns);

    format!(
        "INSERT INTO {quoted_table} ({}) VALUES ({}) {conflict_clause}",
        quoted_columns.join(", "),
        placeholders.join(", "),
    )
}

/// Fetches the column name -> SQL type map for `table_name`, used to
/// decide how each field in a record should be coerced before binding.
pub async fn get_column_types(pool: &WarehousePool, table_name: &str) -> Result<BTreeMap<String, String>> {
    let mut types = BTreeMap::new();
    match pool {
        WarehousePool::PostgreSql(pg) => {
            let rows = sqlx::query(
                "SELECT column_name, data_type FROM information_schema.columns WHERE table_name = $1",
            )
            .bind(table_name)
            .fetch_all(pg)
            .await?;
            for row in rows {
                types.insert(row.get::<String, _>("column_name"), row.get::<String, _>("data_type"));
            }
        }
        WarehousePool::MySql(my) => {
            let rows = sqlx::query(
                "SELECT column_name, data_type FROM information_schema.columns WHERE table_schema = DATABASE() AND table_name = ?",
            )
            .bind(table_name)
            .fetch_all(my)
            .await?;
            for row in rows {
                types.insert(row.get::<String, _>("column_name"), row.get::<String, _>("data_type"));
            }
        }
    }
    debug!(table_name, columns = types.len(), "loaded column types for upsert");
    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_integer_from_string() {
        assert_eq!(coerce_value(&json!("42"), "BIGINT"), CoercedValue::Integer(42));
    }

    #[test]
    fn coerces_money_to_bigdecimal() {
        let value = coerce_value(&json!("1234.56"), "FLOAT");
        assert_eq!(value, CoercedValue::Decimal(BigDecimal::from_str("1234.56").unwrap()));
    }

    #[test]
    fn coerces_bitrix_char_booleans() {
        assert_eq!(coerce_value(&json!("Y"), "BOOLEAN"), CoercedValue::Boolean(true));
        assert_eq!(coerce_value(&json!("N"), "BOOLEAN"), CoercedValue::Boolean(false));
    }

    #[test]
    fn coerces_rfc3339_with_offset() {
        let value = coerce_value(&json!("2024-03-01T10:30:00+03:00"), "TIMESTAMP");
        assert!(matches!(value, CoercedValue::Timestamp(_)));
    }

    #[test]
    fn coerces_bare_z_suffixed_timestamp() {
        let value = coerce_value(&json!("2024-03-01T10:30:00Z"), "TIMESTAMP");
        assert!(matches!(value, CoercedValue::Timestamp(_)));
    }

    #[test]
    fn null_raw_value_coerces_to_null_carrying_the_column_kind() {
        assert_eq!(coerce_value(&Value::Null, "BIGINT"), CoercedValue::Null(ColumnKind::Integer));
        assert_eq!(coerce_value(&Value::Null, "BOOLEAN"), CoercedValue::Null(ColumnKind::Boolean));
        assert_eq!(coerce_value(&Value::Null, "TIMESTAMP"), CoercedValue::Null(ColumnKind::Timestamp));
        assert_eq!(coerce_value(&Value::Null, "VARCHAR(255)"), CoercedValue::Null(ColumnKind::Text));
    }

    #[test]
    fn text_passthrough_for_varchar() {
        assert_eq!(
            coerce_value(&json!("hello"), "VARCHAR(255)"),
            CoercedValue::Text("hello".to_string())
        );
    }

    #[test]
    fn postgres_upsert_sql_has_conflict_target() {
        let sql = build_upsert_sql(
            Dialect::PostgreSql,
            "crm_deals",
            &["bitrix_id"],
            &["bitrix_id".to_string(), "title".to_string(), "updated_at".to_string()],
        );
        assert!(sql.starts_with("INSERT INTO \"crm_deals\""));
        assert!(sql.contains("ON CONFLICT (bitrix_id) DO UPDATE SET title = EXCLUDED.title, updated_at = NOW()"));
        assert!(!sql.contains("EXCLUDED.updated_at"));
    }

    #[test]
    fn mysql_upsert_sql_uses_question_placeholders() {
        let sql = build_upsert_sql(
            Dialect::MySql,
            "crm_currencies",
            &["currency_id"],
            &["currency_id".to_string(), "sort".to_string(), "updated_at".to_string()],
        );
        assert!(sql.contains("VALUES (?, ?, ?)"));
        assert!(sql.contains("ON DUPLICATE KEY UPDATE sort = VALUES(sort), updated_at = NOW()"));
    }
}
