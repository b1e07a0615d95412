use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use simplivity_mgmt::error::{OvcError, OvcResult};
use simplivity_mgmt::state::{
    self, ResourceStore, MSG_ALREADY_ABSENT, MSG_ALREADY_PRESENT, MSG_CREATED, MSG_DELETED,
    MSG_UPDATED,
};
use simplivity_mgmt::types::Resource;

fn obj(value: Value) -> Resource {
    value.as_object().cloned().unwrap()
}

/// In-memory OVC stand-in. Create decorates the stored resource with the
/// server-generated fields a real OVC adds, so the second reconciliation
/// pass sees realistic representation noise.
#[derive(Default)]
struct FakeOvc {
    resources: Mutex<Vec<Resource>>,
    mutations: AtomicUsize,
}

impl FakeOvc {
    fn seeded(resources: Vec<Value>) -> Self {
        Self {
            resources: Mutex::new(resources.into_iter().map(obj).collect()),
            mutations: AtomicUsize::new(0),
        }
    }

    fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceStore for FakeOvc {
    async fn get_by_name(&self, name: &str) -> OvcResult<Resource> {
        self.resources
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.get("name").and_then(Value::as_str) == Some(name))
            .cloned()
            .ok_or_else(|| OvcError::not_found(format!("no resource named '{name}'")))
    }

    async fn create(&self, desired: &Resource) -> OvcResult<Resource> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut live = desired.clone();
        live.insert("id".to_string(), json!("b8f0c9ac-4b10-4f44-a2b1-1f7e87f0e2aa"));
        live.insert("created_at".to_string(), json!("2024-06-01T10:00:00Z"));
        live.insert("deleted_at".to_string(), Value::Null);
        live.insert("backup_count".to_string(), json!(0));
        self.resources.lock().unwrap().push(live.clone());
        Ok(live)
    }

    async fn update(&self, current: &Resource, merged: &Resource) -> OvcResult<Resource> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut resources = self.resources.lock().unwrap();
        for slot in resources.iter_mut() {
            if slot.get("id") == current.get("id") {
                *slot = merged.clone();
                return Ok(merged.clone());
            }
        }
        Err(OvcError::not_found("resource vanished mid-update"))
    }

    async fn delete(&self, current: &Resource) -> OvcResult<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.resources
            .lock()
            .unwrap()
            .retain(|r| r.get("id") != current.get("id"));
        Ok(())
    }
}

#[tokio::test]
async fn second_present_pass_is_a_noop() {
    let store = FakeOvc::default();
    let patch = obj(json!({"name": "ds01", "size": 1073741824, "tags": []}));

    let first = state::ensure_present(&store, &patch).await.unwrap();
    assert!(first.changed);
    assert_eq!(first.msg, MSG_CREATED);

    // Same request again: the live copy now carries server noise (id,
    // timestamps, null / zero fields) and must still compare equal.
    let second = state::ensure_present(&store, &patch).await.unwrap();
    assert!(!second.changed);
    assert_eq!(second.msg, MSG_ALREADY_PRESENT);
    assert_eq!(store.mutation_count(), 1);
}

#[tokio::test]
async fn numeric_representation_noise_is_ignored() {
    let store = FakeOvc::seeded(vec![json!({
        "id": "1",
        "name": "ds01",
        "size": 2.0e10,
        "state": "ALIVE"
    })]);
    let patch = obj(json!({"name": "ds01", "size": 20000000000u64}));

    let report = state::ensure_present(&store, &patch).await.unwrap();

    assert!(!report.changed);
    assert_eq!(store.mutation_count(), 0);
}

#[tokio::test]
async fn reordered_rule_lists_do_not_trigger_updates() {
    let monday = json!({"name": "r1", "days": "Mon", "frequency": 3600});
    let tuesday = json!({"name": "r2", "days": "Tue", "frequency": 7200});
    let store = FakeOvc::seeded(vec![json!({
        "id": "p1",
        "name": "gold",
        "rules": [monday.clone(), tuesday.clone()]
    })]);
    let patch = obj(json!({"name": "gold", "rules": [tuesday, monday]}));

    let report = state::ensure_present(&store, &patch).await.unwrap();

    assert!(!report.changed);
    assert_eq!(report.msg, MSG_ALREADY_PRESENT);
}

#[tokio::test]
async fn real_difference_issues_one_update() {
    let store = FakeOvc::seeded(vec![json!({"id": "1", "name": "ds01", "size": 10})]);
    let patch = obj(json!({"name": "ds01", "size": 20}));

    let report = state::ensure_present(&store, &patch).await.unwrap();

    assert!(report.changed);
    assert_eq!(report.msg, MSG_UPDATED);
    assert_eq!(store.mutation_count(), 1);
    assert_eq!(report.resource.unwrap().get("size"), Some(&json!(20)));
}

#[tokio::test]
async fn rename_travels_through_new_name() {
    let store = FakeOvc::seeded(vec![json!({"id": "1", "name": "old-name"})]);
    let patch = obj(json!({"name": "old-name", "new_name": "new-name"}));

    let report = state::ensure_present(&store, &patch).await.unwrap();
    assert!(report.changed);

    let renamed = store.get_by_name("new-name").await.unwrap();
    assert_eq!(renamed.get("name"), Some(&json!("new-name")));
    assert!(!renamed.contains_key("new_name"));
    assert!(store.get_by_name("old-name").await.is_err());
}

#[tokio::test]
async fn absent_deletes_then_stays_quiet() {
    let store = FakeOvc::seeded(vec![json!({"id": "1", "name": "ds01"})]);

    let first = state::ensure_absent(&store, "ds01").await.unwrap();
    assert!(first.changed);
    assert_eq!(first.msg, MSG_DELETED);

    let second = state::ensure_absent(&store, "ds01").await.unwrap();
    assert!(!second.changed);
    assert_eq!(second.msg, MSG_ALREADY_ABSENT);
    assert_eq!(store.mutation_count(), 1);
}
