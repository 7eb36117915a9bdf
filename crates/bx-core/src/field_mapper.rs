//! Converts Bitrix field metadata into warehouse column definitions.

use std::collections::BTreeMap;

/// A single resolved column definition derived from a Bitrix field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Normalized warehouse column name (`lower(field_id)`).
    pub column_name: String,
    /// Original Bitrix field id, preserved for diagnostics.
    pub field_id: String,
    /// SQL type name emitted in `CREATE TABLE`/`ALTER TABLE` statements.
    pub sql_type_name: &'static str,
    /// Human-readable title, emitted as a column comment.
    pub description: Option<String>,
}

impl FieldInfo {
    pub fn new(field_id: &str, bitrix_type: &str, is_multiple: bool, description: Option<String>) -> Self {
        FieldInfo {
            column_name: field_id.to_lowercase(),
            field_id: field_id.to_string(),
            sql_type_name: sql_type_for(bitrix_type, is_multiple),
            description,
        }
    }
}

/// Maps a Bitrix field type name to a warehouse SQL type name.
///
/// Complete list per the field vocabulary; unknown types default to
/// `VARCHAR(255)`. Multi-valued fields (`isMultiple=true`) are always
/// stored as `TEXT` holding a JSON array, regardless of their declared
/// scalar type.
fn sql_type_for(bitrix_type: &str, is_multiple: bool) -> &'static str {
    if is_multiple {
        return "TEXT";
    }
    match bitrix_type {
        "text" | "address" => "TEXT",
        "integer" => "BIGINT",
        "double" | "float" | "money" => "FLOAT",
        "datetime" | "date" => "TIMESTAMP",
        "boolean" => "BOOLEAN",
        "string" | "char" | "url" | "file" | "disk_file" | "employee" | "enumeration" => {
            "VARCHAR(255)"
        }
        t if t.starts_with("crm_") || t.starts_with("iblock_") => "VARCHAR(255)",
        "resourcebooking" | "hlblock" | "video" => "VARCHAR(255)",
        _ => "VARCHAR(255)",
    }
}

/// Picks the best available human title from a Bitrix field metadata
/// object, in priority order: `title`, `formLabel`,
/// `LIST_COLUMN_LABEL.ru`, `EDIT_FORM_LABEL.ru`.
pub fn pick_description(raw: &serde_json::Map<String, serde_json::Value>) -> Option<String> {
    raw.get("title")
        .and_then(|v| v.as_str())
        .or_else(|| raw.get("formLabel").and_then(|v| v.as_str()))
        .or_else(|| {
            raw.get("LIST_COLUMN_LABEL")
                .and_then(|v| v.get("ru"))
                .and_then(|v| v.as_str())
        })
        .or_else(|| {
            raw.get("EDIT_FORM_LABEL")
                .and_then(|v| v.get("ru"))
                .and_then(|v| v.as_str())
        })
        .map(str::to_string)
}

/// Merges a standard field list with user-field entries. Entries in
/// `user_fields` override standard entries that normalize to the same
/// column name, since Bitrix occasionally redefines a standard field as
/// a tenant-specific `UF_*` field.
///
/// A `BTreeMap` (not a `HashMap`) keeps iteration order deterministic by
/// column name, so `CREATE TABLE` emits columns in a stable order across
/// runs.
pub fn merge_fields(
    standard: Vec<FieldInfo>,
    user_fields: Vec<FieldInfo>,
) -> BTreeMap<String, FieldInfo> {
    let mut merged: BTreeMap<String, FieldInfo> = BTreeMap::new();
    for field in standard {
        merged.insert(field.column_name.clone(), field);
    }
    for field in user_fields {
        merged.insert(field.column_name.clone(), field);
    }
    merged
}

/// Stateless field mapper: translates raw Bitrix field metadata (as
/// returned by `crm.*.fields` / `*.userfield.list`) into [`FieldInfo`].
pub struct FieldMapper;

impl FieldMapper {
    /// Builds a [`FieldInfo`] list from a `{field_id: metadata}` map as
    /// returned by `GetEntityFields`.
    pub fn prepare_fields(raw: &serde_json::Map<String, serde_json::Value>) -> Vec<FieldInfo> {
        raw.iter()
            .map(|(field_id, meta)| {
                let obj = meta.as_object().cloned().unwrap_or_default();
                let bitrix_type = obj
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("string");
                let is_multiple = obj
                    .get("isMultiple")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                FieldInfo::new(field_id, bitrix_type, is_multiple, pick_description(&obj))
            })
            .collect()
    }

    /// Builds a [`FieldInfo`] list from `GetUserFields`, using the same
    /// metadata shape but defaulting the column name to the already
    /// upper-snake `UF_*` field id lowercased.
    pub fn prepare_user_fields(
        raw: &serde_json::Map<String, serde_json::Value>,
    ) -> Vec<FieldInfo> {
        Self::prepare_fields(raw)
    }

    pub fn merge(standard: Vec<FieldInfo>, user_fields: Vec<FieldInfo>) -> BTreeMap<String, FieldInfo> {
        merge_fields(standard, user_fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_known_types() {
        assert_eq!(sql_type_for("string", false), "VARCHAR(255)");
        assert_eq!(sql_type_for("text", false), "TEXT");
        assert_eq!(sql_type_for("integer", false), "BIGINT");
        assert_eq!(sql_type_for("double", false), "FLOAT");
        assert_eq!(sql_type_for("datetime", false), "TIMESTAMP");
        assert_eq!(sql_type_for("boolean", false), "BOOLEAN");
        assert_eq!(sql_type_for("crm_status", false), "VARCHAR(255)");
    }

    #[test]
    fn unknown_type_defaults_to_varchar() {
        assert_eq!(sql_type_for("some_future_type", false), "VARCHAR(255)");
    }

    #[test]
    fn multiple_field_is_always_text() {
        assert_eq!(sql_type_for("integer", true), "TEXT");
    }

    #[test]
    fn empty_field_list_maps_to_empty() {
        let raw = serde_json::Map::new();
        assert!(FieldMapper::prepare_fields(&raw).is_empty());
    }

    #[test]
    fn user_field_overrides_standard_with_same_column_name() {
        let standard = vec![FieldInfo::new("STAGE_ID", "crm_status", false, Some("Stage".into()))];
        let user = vec![FieldInfo::new("stage_id", "string", false, Some("Custom stage".into()))];
        let merged = merge_fields(standard, user);
        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged.get("stage_id").unwrap().description,
            Some("Custom stage".into())
        );
    }

    #[test]
    fn description_priority_order() {
        let raw = json!({
            "formLabel": "Form label",
            "LIST_COLUMN_LABEL": {"ru": "List label"},
        })
        .as_object()
        .unwrap()
        .clone();
        assert_eq!(pick_description(&raw), Some("Form label".to_string()));
    }
}
