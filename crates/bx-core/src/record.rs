//! Untyped Bitrix record representation.
//!
//! Bitrix entities carry a known core (id, audit timestamps) plus an open
//! set of extension keys (`UF_*` user fields, entity-specific columns).
//! Rather than modelling every entity type as its own struct, a record is
//! kept as a flat key/value map and flattened against the warehouse table
//! catalog at upsert time — the catalog, not a Rust type, is the source
//! of truth for which keys survive.

use serde_json::Value;
use std::collections::BTreeMap;

/// A single Bitrix record as returned by the client, before coercion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BitrixRecord(pub BTreeMap<String, Value>);

impl BitrixRecord {
    pub fn new() -> Self {
        BitrixRecord(BTreeMap::new())
    }

    pub fn from_map(map: BTreeMap<String, Value>) -> Self {
        BitrixRecord(map)
    }

    /// Constructs a record from a `serde_json::Value`, keeping only
    /// object members (non-object inputs yield an empty record).
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => BitrixRecord(map.into_iter().collect()),
            _ => BitrixRecord::new(),
        }
    }

    /// The raw `ID`/`id` field, if present, before the `id -> bitrix_id`
    /// rename the upsert writer performs.
    pub fn id(&self) -> Option<&Value> {
        self.0.get("ID").or_else(|| self.0.get("id"))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_prefers_uppercase_key() {
        let mut rec = BitrixRecord::new();
        rec.insert("ID", json!("42"));
        rec.insert("id", json!("0"));
        assert_eq!(rec.id(), Some(&json!("42")));
    }

    #[test]
    fn from_value_non_object_is_empty() {
        let rec = BitrixRecord::from_value(json!([1, 2, 3]));
        assert!(rec.0.is_empty());
    }
}
