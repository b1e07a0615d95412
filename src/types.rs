//! Shared types for HPE SimpliVity / OmniStack management.
//!
//! OmniStack resources are open-schema JSON objects; they travel through the
//! crate as [`Resource`] maps rather than closed structs so that fields added
//! by newer OmniStack releases survive a round trip untouched. The REST API
//! uses `snake_case` field names throughout, so no serde renaming is needed
//! on the typed envelopes below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A point-in-time JSON image of one remote resource.
pub type Resource = serde_json::Map<String, serde_json::Value>;

/// Resource `id` field, when present.
pub fn resource_id(resource: &Resource) -> Option<&str> {
    resource.get("id").and_then(|v| v.as_str())
}

/// Resource `name` field, when present.
pub fn resource_name(resource: &Resource) -> Option<&str> {
    resource.get("name").and_then(|v| v.as_str())
}

// ── Collection envelopes ────────────────────────────────────────────────

/// Pull the resource list out of an OmniStack collection envelope
/// (`{"offset": 0, "limit": 500, "count": 2, "<key>": [...]}`).
pub fn extract_collection(body: &serde_json::Value, key: &str) -> Vec<Resource> {
    body.get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect()
        })
        .unwrap_or_default()
}

/// Pull the single resource out of an OmniStack object envelope
/// (`{"<key>": {...}}`).
pub fn extract_single(body: &serde_json::Value, key: &str) -> Option<Resource> {
    body.get(key).and_then(|v| v.as_object()).cloned()
}

// ── Tasks ───────────────────────────────────────────────────────────────

/// State of an OmniStack task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    InProgress,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl Default for TaskState {
    fn default() -> Self {
        Self::Unknown
    }
}

impl TaskState {
    /// Whether polling should stop. Unknown states terminate the poll so an
    /// unexpected value cannot hang the caller.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// A resource touched by a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectedObject {
    #[serde(default)]
    pub object_id: Option<String>,
    #[serde(default)]
    pub object_type: Option<String>,
}

/// An OmniStack task, as returned by mutation endpoints and
/// `GET /api/tasks/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    #[serde(default)]
    pub state: TaskState,
    #[serde(default)]
    pub affected_objects: Vec<AffectedObject>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub percent_complete: Option<u32>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl TaskInfo {
    /// ID of the first affected object, the usual handle onto the resource a
    /// mutation produced.
    pub fn first_affected_id(&self) -> Option<&str> {
        self.affected_objects
            .iter()
            .find_map(|o| o.object_id.as_deref())
    }
}

/// Wire envelope for task responses (`{"task": {...}}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task: TaskInfo,
}

// ── Query parameters ────────────────────────────────────────────────────

/// Sort direction for collection queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Ascending,
    Descending,
}

impl Order {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        }
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::Descending
    }
}

/// Typed query parameters for OmniStack collection endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetAllParams {
    /// Maximum number of results to return.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Number of results to skip.
    #[serde(default)]
    pub offset: u32,
    /// Field to sort by; no sorting when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    /// Sort direction, applied when `sort` is set.
    #[serde(default)]
    pub order: Order,
    /// Field equality filters (`name=vm01`, `state=ALIVE`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,
    /// Comma-separated list of fields to return; all fields when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<String>,
    /// Case-sensitive filter matching (the API default).
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
    /// Include fields the API omits by default.
    #[serde(default)]
    pub show_optional_fields: bool,
}

fn default_limit() -> u32 {
    500
}

fn default_true() -> bool {
    true
}

impl Default for GetAllParams {
    fn default() -> Self {
        Self {
            limit: 500,
            offset: 0,
            sort: None,
            order: Order::Descending,
            filters: BTreeMap::new(),
            fields: None,
            case_sensitive: true,
            show_optional_fields: false,
        }
    }
}

impl GetAllParams {
    /// Parameters selecting exactly the resource with the given name.
    pub fn name_filter(name: &str) -> Self {
        let mut params = Self::default();
        params
            .filters
            .insert("name".to_string(), name.to_string());
        params
    }

    /// Render as query pairs in a deterministic order.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = vec![
            ("limit".to_string(), self.limit.to_string()),
            ("offset".to_string(), self.offset.to_string()),
        ];
        if let Some(sort) = &self.sort {
            query.push(("sort".to_string(), sort.clone()));
            query.push(("order".to_string(), self.order.as_api_str().to_string()));
        }
        if let Some(fields) = &self.fields {
            query.push(("fields".to_string(), fields.clone()));
        }
        if !self.case_sensitive {
            query.push(("case".to_string(), "insensitive".to_string()));
        }
        if self.show_optional_fields {
            query.push(("show_optional_fields".to_string(), "true".to_string()));
        }
        for (key, value) in &self.filters {
            query.push((key.clone(), value.clone()));
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_envelope_parses() {
        let body = json!({
            "task": {
                "id": "4451a542-c6ef-44b2-ac2e-880659de4dc4",
                "state": "IN_PROGRESS",
                "affected_objects": [
                    {"object_id": "vm-99", "object_type": "virtual_machine"}
                ],
                "error_code": 0,
                "percent_complete": 40,
                "start_time": "2020-06-24T09:13:05Z"
            }
        });
        let envelope: TaskEnvelope = serde_json::from_value(body).unwrap();
        assert_eq!(envelope.task.state, TaskState::InProgress);
        assert_eq!(envelope.task.first_affected_id(), Some("vm-99"));
        assert!(!envelope.task.state.is_terminal());
    }

    #[test]
    fn unexpected_task_state_is_terminal() {
        let state: TaskState = serde_json::from_value(json!("CANCELLING")).unwrap();
        assert_eq!(state, TaskState::Unknown);
        assert!(state.is_terminal());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
    }

    #[test]
    fn extract_collection_from_envelope() {
        let body = json!({
            "offset": 0,
            "limit": 500,
            "count": 2,
            "virtual_machines": [
                {"id": "a", "name": "vm01"},
                {"id": "b", "name": "vm02"}
            ]
        });
        let items = extract_collection(&body, "virtual_machines");
        assert_eq!(items.len(), 2);
        assert_eq!(resource_name(&items[0]), Some("vm01"));
        assert_eq!(resource_id(&items[1]), Some("b"));
    }

    #[test]
    fn extract_collection_missing_key() {
        let body = json!({"offset": 0, "count": 0});
        assert!(extract_collection(&body, "datastores").is_empty());
    }

    #[test]
    fn extract_single_from_envelope() {
        let body = json!({"datastore": {"id": "ds-1", "name": "DS1"}});
        let ds = extract_single(&body, "datastore").unwrap();
        assert_eq!(resource_id(&ds), Some("ds-1"));
        assert!(extract_single(&body, "policy").is_none());
    }

    #[test]
    fn get_all_params_default_query() {
        let query = GetAllParams::default().to_query();
        assert_eq!(
            query,
            vec![
                ("limit".to_string(), "500".to_string()),
                ("offset".to_string(), "0".to_string()),
            ]
        );
    }

    #[test]
    fn get_all_params_full_query() {
        let mut params = GetAllParams {
            limit: 10,
            offset: 2,
            sort: Some("name".to_string()),
            order: Order::Ascending,
            case_sensitive: false,
            ..Default::default()
        };
        params.filters.insert("state".to_string(), "ALIVE".to_string());
        params.filters.insert("name".to_string(), "vm01".to_string());

        let query = params.to_query();
        assert_eq!(
            query,
            vec![
                ("limit".to_string(), "10".to_string()),
                ("offset".to_string(), "2".to_string()),
                ("sort".to_string(), "name".to_string()),
                ("order".to_string(), "ascending".to_string()),
                ("case".to_string(), "insensitive".to_string()),
                // filters render in key order
                ("name".to_string(), "vm01".to_string()),
                ("state".to_string(), "ALIVE".to_string()),
            ]
        );
    }

    #[test]
    fn name_filter_params() {
        let params = GetAllParams::name_filter("gold-policy");
        assert_eq!(params.filters.get("name").map(String::as_str), Some("gold-policy"));
        assert_eq!(params.limit, 500);
    }
}
