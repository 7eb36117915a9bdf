//! Key normalization for Bitrix responses that use camelCase (tasks API)
//! instead of the canonical UPPER_SNAKE_CASE the rest of the client and
//! the warehouse expect.

use regex::Regex;
use std::sync::OnceLock;

fn boundary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap())
}

/// Converts `camelCase` (or `PascalCase`) to `UPPER_SNAKE_CASE` by
/// inserting `_` at every lowercase-or-digit-to-uppercase boundary, then
/// upper-casing the whole string.
///
/// Identity on strings that are already upper-snake (`ID`,
/// `RESPONSIBLE_ID`, `UF_CRM_TASK`) — see the round-trip law in the
/// Entity Sync Service's tests.
pub fn camel_to_upper_snake(input: &str) -> String {
    boundary_re()
        .replace_all(input, "${1}_${2}")
        .to_uppercase()
}

/// Recursively normalizes every object key in a JSON value using
/// [`camel_to_upper_snake`]. Used to fix up `tasks.task.list` responses,
/// whose nested `task` objects carry camelCase keys.
pub fn normalize_keys(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let normalized = map
                .into_iter()
                .map(|(k, v)| (camel_to_upper_snake(&k), normalize_keys(v)))
                .collect();
            Value::Object(normalized)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_camel_case() {
        assert_eq!(camel_to_upper_snake("responsibleId"), "RESPONSIBLE_ID");
        assert_eq!(camel_to_upper_snake("createdDate"), "CREATED_DATE");
    }

    #[test]
    fn identity_on_already_upper_snake() {
        assert_eq!(camel_to_upper_snake("UF_CRM_TASK"), "UF_CRM_TASK");
        assert_eq!(camel_to_upper_snake("ID"), "ID");
        assert_eq!(camel_to_upper_snake("RESPONSIBLE_ID"), "RESPONSIBLE_ID");
    }

    #[test]
    fn normalizes_nested_object_keys() {
        let input = json!({"taskId": 1, "subTask": {"dueDate": "2024-01-01"}});
        let normalized = normalize_keys(input);
        assert_eq!(normalized["TASK_ID"], json!(1));
        assert_eq!(normalized["SUB_TASK"]["DUE_DATE"], json!("2024-01-01"));
    }
}
