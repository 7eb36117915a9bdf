//! Webhook parser & dispatcher: decodes Bitrix's URL-encoded,
//! nested-bracket form bodies into structured events and routes them onto
//! the sync queue.
//!
//! Bitrix posts bodies like `event=ONCRMDEALADD&data[FIELDS][ID]=42`.
//! `url::form_urlencoded` handles the flat key/value split; the nested
//! `[FIELDS][ID]` structure is then unpacked by a hand-rolled bracket
//! splitter, since no general URL-decoding crate models Bitrix's specific
//! nesting convention (repeated bracket segments merge into a list when a
//! terminal segment's value already exists).

use std::sync::Arc;

use serde_json::{json, Value};

use crate::queue::{EnqueueResult, SyncQueue, SyncTask, TaskType, PRIORITY_WEBHOOK};

/// A decoded Bitrix webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub event: String,
    pub entity_type: String,
    pub bitrix_id: String,
    pub is_delete: bool,
}

const KNOWN_ENTITY_EVENTS: &[&str] = &["DEAL", "CONTACT", "LEAD", "COMPANY"];
const KNOWN_ACTIONS: &[&str] = &["ADD", "UPDATE", "DELETE"];

/// Parses a `application/x-www-form-urlencoded` body with nested bracket
/// keys (`data[FIELDS][ID]=42`) into a structured `serde_json::Value`.
pub fn parse_nested_query(body: &str) -> Value {
    let mut root = serde_json::Map::new();

    for (raw_key, raw_value) in url::form_urlencoded::parse(body.as_bytes()) {
        let segments = split_bracket_key(&raw_key);
        if segments.is_empty() {
            continue;
        }
        insert_nested(&mut root, &segments, raw_value.into_owned());
    }

    Value::Object(root)
}

/// Splits `a[b][c]` into `["a", "b", "c"]`; empty bracket segments
/// (`a[][c]`, Bitrix never emits these but the parser tolerates them) are
/// dropped.
fn split_bracket_key(key: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut rest = key;

    if let Some(idx) = rest.find('[') {
        segments.push(rest[..idx].to_string());
        rest = &rest[idx..];
        while let Some(start) = rest.find('[') {
            let Some(end) = rest[start..].find(']') else { break };
            let segment = &rest[start + 1..start + end];
            if !segment.is_empty() {
                segments.push(segment.to_string());
            }
            rest = &rest[start + end + 1..];
        }
    } else {
        segments.push(rest.to_string());
    }

    segments
}

/// Inserts `value` into `root` following `segments`, building nested
/// objects as needed. If the terminal segment already holds a value, it
/// is promoted to (or appended onto) a list.
fn insert_nested(root: &mut serde_json::Map<String, Value>, segments: &[String], value: String) {
    let Some((head, rest)) = segments.split_first() else { return };

    if rest.is_empty() {
        match root.get_mut(head) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let previous = existing.clone();
                *existing = Value::Array(vec![previous, Value::String(value)]);
            }
            None => {
                root.insert(head.clone(), Value::String(value));
            }
        }
        return;
    }

    let entry = root.entry(head.clone()).or_insert_with(|| Value::Object(serde_json::Map::new()));
    if let Value::Object(nested) = entry {
        insert_nested(nested, rest, value);
    }
}

/// §4.J event routing. Known events are the 12 `ONCRM<ENTITY><ACTION>`
/// combinations; anything else yields `None` (caller treats it as
/// `ignored/unsupported_event`).
pub fn parse_event(body: &str) -> Option<WebhookEvent> {
    let parsed = parse_nested_query(body);
    let event = parsed.get("event")?.as_str()?.to_string();
    let bitrix_id = parsed
        .get("data")?
        .get("FIELDS")?
        .get("ID")?
        .as_str()?
        .to_string();

    let upper = event.to_ascii_uppercase();
    let without_prefix = upper.strip_prefix("ONCRM")?;

    let entity = KNOWN_ENTITY_EVENTS.iter().find(|e| without_prefix.starts_with(**e))?;
    let action = without_prefix.strip_prefix(entity)?;
    if !KNOWN_ACTIONS.contains(&action) {
        return None;
    }

    Some(WebhookEvent {
        event,
        entity_type: entity.to_ascii_lowercase(),
        bitrix_id,
        is_delete: action == "DELETE",
    })
}

/// Dispatches a parsed event onto the sync queue. Bitrix expects an
/// immediate `{status: accepted}` response from the caller, before this
/// runs — callers should return that response first and dispatch
/// fire-and-forget, or in the background.
pub async fn dispatch(queue: &Arc<SyncQueue>, webhook_event: WebhookEvent) -> EnqueueResult {
    let task_type = if webhook_event.is_delete { TaskType::WebhookDelete } else { TaskType::Webhook };
    let task = SyncTask::new(
        task_type,
        webhook_event.entity_type.clone(),
        PRIORITY_WEBHOOK,
        json!({ "bitrix_id": webhook_event.bitrix_id }),
    );
    queue.enqueue(task).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_and_nested_keys() {
        let parsed = parse_nested_query("event=ONCRMDEALADD&data[FIELDS][ID]=42");
        assert_eq!(parsed["event"], json!("ONCRMDEALADD"));
        assert_eq!(parsed["data"]["FIELDS"]["ID"], json!("42"));
    }

    #[test]
    fn repeated_terminal_key_merges_into_a_list() {
        let parsed = parse_nested_query("tag=a&tag=b");
        assert_eq!(parsed["tag"], json!(["a", "b"]));
    }

    #[test]
    fn recognizes_all_twelve_known_events() {
        for entity in KNOWN_ENTITY_EVENTS {
            for action in KNOWN_ACTIONS {
                let body = format!("event=ONCRM{entity}{action}&data[FIELDS][ID]=1");
                let event = parse_event(&body).unwrap_or_else(|| panic!("should parse {entity}{action}"));
                assert_eq!(event.entity_type, entity.to_ascii_lowercase());
                assert_eq!(event.is_delete, *action == "DELETE");
            }
        }
    }

    #[test]
    fn unknown_event_is_ignored() {
        assert!(parse_event("event=ONSOMETHINGELSE&data[FIELDS][ID]=1").is_none());
    }

    #[test]
    fn missing_id_is_ignored() {
        assert!(parse_event("event=ONCRMDEALADD").is_none());
    }
}
