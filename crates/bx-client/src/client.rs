//! The Bitrix24 REST-over-webhook client.
//!
//! A single `call` method talks to the webhook URL; everything else
//! (pagination, per-entity-type dispatch, retry/backoff) is layered on top
//! of it, mirroring the original service's `BitrixClient` class.

use std::time::Duration;

use bx_core::BitrixError;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{classify_error_code, reclassify_if_time_limit};
use crate::field_types::{build_field_definitions, CALL_FIELD_TYPES, STAGE_HISTORY_FIELD_TYPES, USER_FIELD_TYPES};
use crate::normalize::normalize_keys;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY_SECS: u64 = 1;
const MIN_DELAY_SECS: u64 = 4;
const MAX_DELAY_SECS: u64 = 60;
const PAGE_SIZE: u64 = 50;

/// Typed, retrying, paginating Bitrix24 client bound to one webhook URL.
pub struct BitrixClient {
    http: reqwest::Client,
    webhook_url: String,
}

impl BitrixClient {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url: webhook_url.into(),
        }
    }

    pub fn with_http_client(webhook_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            http,
            webhook_url: webhook_url.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        let base = self.webhook_url.trim_end_matches('/');
        format!("{base}/{method}.json")
    }

    /// Calls a single Bitrix REST method once, with no retry. Returns the
    /// raw `result` member of the envelope.
    async fn call_once(&self, method: &str, params: &Value) -> Result<Value, BitrixError> {
        let url = self.method_url(method);
        let response = self.http.post(&url).json(params).send().await?;
        let body: Value = response.json().await?;

        if let Some(error_code) = body.get("error").and_then(Value::as_str) {
            let description = body
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or(error_code);
            return Err(classify_error_code(error_code, description));
        }

        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Calls a Bitrix REST method, retrying [`BitrixError::RateLimited`]
    /// with capped exponential backoff (base 1s, min 4s, max 60s, 5
    /// attempts). Every other error is fatal immediately.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, BitrixError> {
        let mut attempt = 0u32;
        loop {
            match self.call_once(method, &params).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    let err = match &err {
                        BitrixError::Transport(inner) => {
                            reclassify_if_time_limit(&inner.to_string()).unwrap_or(err)
                        }
                        _ => err,
                    };

                    if !err.is_retryable() || attempt + 1 >= MAX_ATTEMPTS {
                        return Err(err);
                    }

                    let delay = (BASE_DELAY_SECS * 2u64.pow(attempt)).clamp(MIN_DELAY_SECS, MAX_DELAY_SECS);
                    warn!(method, attempt, delay, "retrying after rate limit");
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Transparently paginates a list method using the `start`/`next`/
    /// `total` envelope members, accumulating every page's `result` array.
    pub async fn get_all(&self, method: &str, mut params: Value) -> Result<Vec<Value>, BitrixError> {
        let mut collected = Vec::new();
        let mut start = 0u64;

        loop {
            params["start"] = json!(start);
            let result = self.call(method, params.clone()).await?;

            let page = match &result {
                Value::Array(items) => items.clone(),
                Value::Object(map) => map
                    .values()
                    .find_map(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default(),
                _ => Vec::new(),
            };

            let page_len = page.len() as u64;
            collected.extend(page);

            if page_len < PAGE_SIZE {
                break;
            }
            start += PAGE_SIZE;
        }

        Ok(collected)
    }

    /// Fetches every record for an entity type, dispatching to the
    /// appropriate Bitrix API method and unwrapping that method's
    /// particular pagination envelope.
    pub async fn get_entities(&self, entity_type: &str, filter: Value) -> Result<Vec<Value>, BitrixError> {
        match entity_type {
            "user" => self.get_users(filter).await,
            "task" => self.get_tasks(filter).await,
            "call" => self.get_calls(filter).await,
            "stage_history_deal" => self.get_stage_history(2, filter).await,
            "stage_history_lead" => self.get_stage_history(1, filter).await,
            _ => {
                let params = json!({
                    "filter": if filter.is_null() { json!({">ID": 0}) } else { filter },
                    "select": ["*", "UF_*"],
                });
                self.get_all(&format!("crm.{entity_type}.list"), params).await
            }
        }
    }

    async fn get_users(&self, filter: Value) -> Result<Vec<Value>, BitrixError> {
        let params = json!({ "filter": if filter.is_null() { json!({}) } else { filter } });
        self.get_all("user.get", params).await
    }

    async fn get_tasks(&self, filter: Value) -> Result<Vec<Value>, BitrixError> {
        let params = json!({
            "filter": if filter.is_null() { json!({}) } else { filter },
            "select": ["*", "UF_*"],
        });
        let pages = self.get_all("tasks.task.list", params).await?;
        let tasks = unwrap_task_pages(pages);
        Ok(tasks.into_iter().map(normalize_keys).collect())
    }

    async fn get_calls(&self, filter: Value) -> Result<Vec<Value>, BitrixError> {
        let params = json!({ "filter": if filter.is_null() { json!({}) } else { filter } });
        let pages = self.get_all("voximplant.statistic.get", params).await?;
        Ok(pages.into_iter().map(remap_call_id).collect())
    }

    async fn get_stage_history(&self, entity_type_id: u32, filter: Value) -> Result<Vec<Value>, BitrixError> {
        let mut params = json!({
            "filter": if filter.is_null() { json!({}) } else { filter },
        });
        params["filter"]["ENTITY_TYPE_ID"] = json!(entity_type_id);
        let pages = self.get_all("crm.stagehistory.list", params).await?;
        Ok(unwrap_items_pages(pages))
    }

    /// Fetches a single record by bitrix id, dispatching per entity type.
    pub async fn get_entity(&self, entity_type: &str, id: &str) -> Result<Option<Value>, BitrixError> {
        match entity_type {
            "user" => {
                let result = self.call("user.get", json!({ "filter": { "ID": id } })).await?;
                Ok(result.as_array().and_then(|a| a.first().cloned()))
            }
            "task" => {
                let result = self.call("tasks.task.get", json!({ "taskId": id })).await?;
                let task = result.get("task").cloned().unwrap_or(result);
                if task.is_null() {
                    Ok(None)
                } else {
                    Ok(Some(normalize_keys(task)))
                }
            }
            "call" => {
                let calls = self.get_calls(json!({ "CALL_ID": id })).await?;
                Ok(calls.into_iter().next())
            }
            "stage_history_deal" => {
                let rows = self.get_stage_history(2, json!({ "ID": id })).await?;
                Ok(rows.into_iter().next())
            }
            "stage_history_lead" => {
                let rows = self.get_stage_history(1, json!({ "ID": id })).await?;
                Ok(rows.into_iter().next())
            }
            _ => {
                let result = self
                    .call(&format!("crm.{entity_type}.get"), json!({ "id": id }))
                    .await?;
                Ok(if result.is_null() { None } else { Some(result) })
            }
        }
    }

    /// Fetches the standard field catalogue for an entity type, substituting
    /// the built-in type maps for entity types with no `.fields` method.
    pub async fn get_entity_fields(&self, entity_type: &str) -> Result<Value, BitrixError> {
        match entity_type {
            "user" => Ok(Value::Object(build_field_definitions(USER_FIELD_TYPES, "ID"))),
            "call" => Ok(Value::Object(build_field_definitions(CALL_FIELD_TYPES, "CALL_ID"))),
            "stage_history_deal" | "stage_history_lead" => {
                Ok(Value::Object(build_field_definitions(STAGE_HISTORY_FIELD_TYPES, "ID")))
            }
            "task" => {
                let result = self.call("tasks.task.getFields", json!({})).await?;
                Ok(result.get("fields").cloned().unwrap_or(result))
            }
            _ => self.call(&format!("crm.{entity_type}.fields"), json!({})).await,
        }
    }

    /// Fetches user-defined (`UF_*`) field metadata, where supported.
    pub async fn get_userfields(&self, entity_type: &str) -> Result<Vec<Value>, BitrixError> {
        match entity_type {
            "user" => {
                let params = json!({ "filter": { ">ID": 0, "LANG": "ru" } });
                self.get_all("user.userfield.list", params).await
            }
            "call" | "stage_history_deal" | "stage_history_lead" | "task" => {
                debug!(entity_type, "entity type has no separate userfield.list method");
                Ok(Vec::new())
            }
            _ => self.get_all(&format!("crm.{entity_type}.userfield.list"), json!({})).await,
        }
    }

    pub async fn register_webhook(&self, event: &str, handler_url: &str) -> Result<Value, BitrixError> {
        self.call("event.bind", json!({ "event": event, "handler": handler_url }))
            .await
    }

    pub async fn unregister_webhook(&self, event: &str, handler_url: &str) -> Result<Value, BitrixError> {
        self.call("event.unbind", json!({ "event": event, "handler": handler_url }))
            .await
    }

    pub async fn get_registered_webhooks(&self) -> Result<Vec<Value>, BitrixError> {
        self.get_all("event.get", json!({})).await
    }
}

/// `tasks.task.list` returns either a flat `{"tasks": [...]}` object, a
/// bare list, or a list of such objects (seen when Bitrix batches pages
/// internally). Normalizes all three shapes to a flat list of task objects.
fn unwrap_task_pages(pages: Vec<Value>) -> Vec<Value> {
    let mut tasks = Vec::new();
    for page in pages {
        match page {
            Value::Object(ref map) => {
                if let Some(Value::Array(items)) = map.get("tasks") {
                    tasks.extend(items.clone());
                } else {
                    tasks.push(page);
                }
            }
            Value::Array(items) => tasks.extend(items),
            other => tasks.push(other),
        }
    }
    tasks
}

/// `crm.stagehistory.list` returns either `{"items": [...]}` or a bare
/// list of history rows.
fn unwrap_items_pages(pages: Vec<Value>) -> Vec<Value> {
    let mut rows = Vec::new();
    for page in pages {
        match page {
            Value::Object(ref map) => {
                if let Some(Value::Array(items)) = map.get("items") {
                    rows.extend(items.clone());
                } else {
                    rows.push(page);
                }
            }
            Value::Array(items) => rows.extend(items),
            other => rows.push(other),
        }
    }
    rows
}

/// `voximplant.statistic.get` rows key the call id as `CALL_ID`; the rest
/// of the system expects `ID` as the canonical primary key field.
fn remap_call_id(mut row: Value) -> Value {
    if let Some(obj) = row.as_object_mut() {
        if !obj.contains_key("ID") {
            if let Some(call_id) = obj.get("CALL_ID").cloned() {
                obj.insert("ID".to_string(), call_id);
            }
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_url_strips_trailing_slash() {
        let client = BitrixClient::new("https://example.bitrix24.ru/rest/1/abc/");
        assert_eq!(
            client.method_url("crm.deal.list"),
            "https://example.bitrix24.ru/rest/1/abc/crm.deal.list.json"
        );
    }

    #[test]
    fn unwraps_tasks_nested_under_tasks_key() {
        let pages = vec![json!({ "tasks": [{"id": "1"}, {"id": "2"}] })];
        let tasks = unwrap_task_pages(pages);
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn unwraps_bare_list_of_tasks() {
        let pages = vec![json!([{"id": "1"}])];
        let tasks = unwrap_task_pages(pages);
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn unwraps_stage_history_items_key() {
        let pages = vec![json!({ "items": [{"ID": "1"}] })];
        let rows = unwrap_items_pages(pages);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn remaps_call_id_to_id_when_missing() {
        let row = json!({ "CALL_ID": "abc123" });
        let remapped = remap_call_id(row);
        assert_eq!(remapped["ID"], json!("abc123"));
    }

    #[test]
    fn remap_call_id_is_a_no_op_when_id_already_present() {
        let row = json!({ "ID": "1", "CALL_ID": "abc123" });
        let remapped = remap_call_id(row);
        assert_eq!(remapped["ID"], json!("1"));
    }
}
