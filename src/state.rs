//! Present/absent state reconciliation.
//!
//! The generic half of every declarative operation: look the resource up by
//! name, create it if it is missing, otherwise overlay the desired patch on
//! the live state and let [`compare::equal`] decide whether an update call is
//! worth issuing. At most one mutating call happens per pass and nothing is
//! retried.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compare;
use crate::error::{OvcError, OvcResult};
use crate::ovc::OvcClient;
use crate::types::Resource;

pub const MSG_CREATED: &str = "Resource created successfully.";
pub const MSG_UPDATED: &str = "Resource updated successfully.";
pub const MSG_DELETED: &str = "Resource deleted successfully.";
pub const MSG_ALREADY_PRESENT: &str = "Resource is already present.";
pub const MSG_ALREADY_ABSENT: &str = "Resource is already absent.";
pub const MSG_MANDATORY_FIELD_MISSING: &str = "Missing mandatory field: name";

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateReport {
    /// Whether a remote mutation was issued.
    pub changed: bool,
    /// Human-readable outcome message.
    pub msg: String,
    /// The resource after the pass, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
}

impl StateReport {
    pub fn changed(msg: &str, resource: Option<Resource>) -> Self {
        Self {
            changed: true,
            msg: msg.to_string(),
            resource,
        }
    }

    pub fn unchanged(msg: &str, resource: Option<Resource>) -> Self {
        Self {
            changed: false,
            msg: msg.to_string(),
            resource,
        }
    }
}

/// The resource operations reconciliation consumes. Implemented by the
/// managers of resource kinds with full CRUD (datastores, policies) and by
/// in-memory fakes in tests.
#[async_trait]
pub trait ResourceStore {
    /// Fetch the live resource, or a `NotFound` error.
    async fn get_by_name(&self, name: &str) -> OvcResult<Resource>;
    /// Create the resource described by the patch; returns the new resource.
    async fn create(&self, desired: &Resource) -> OvcResult<Resource>;
    /// Apply the merged candidate; returns the updated resource.
    async fn update(&self, current: &Resource, merged: &Resource) -> OvcResult<Resource>;
    /// Remove the resource.
    async fn delete(&self, current: &Resource) -> OvcResult<()>;
}

/// One declarative request against an OVC, regardless of resource kind.
/// The per-resource request types implement this as their single entry
/// point.
#[async_trait]
pub trait StateModule {
    async fn apply(&self, client: &OvcClient) -> OvcResult<StateReport>;
}

/// Overlay a desired-state patch on a copy of the current resource; patch
/// fields win. Shallow, like the wire payloads it feeds.
pub fn overlay(current: &Resource, patch: &Resource) -> Resource {
    let mut merged = current.clone();
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Make sure the resource described by `patch` exists and matches it.
///
/// The lookup uses the patch's `name`; a `new_name` field then replaces
/// `name` in the desired state, which is how renames travel. Exactly one of
/// create / update / nothing happens.
pub async fn ensure_present<S>(store: &S, patch: &Resource) -> OvcResult<StateReport>
where
    S: ResourceStore + Sync,
{
    let lookup_name = patch
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| OvcError::invalid(MSG_MANDATORY_FIELD_MISSING))?;

    let mut desired = patch.clone();
    if let Some(new_name) = desired.remove("new_name") {
        desired.insert("name".to_string(), new_name);
    }

    let current = match store.get_by_name(&lookup_name).await {
        Ok(current) => current,
        Err(e) if e.is_not_found() => {
            log::debug!("resource '{lookup_name}' not found, creating");
            let created = store.create(&desired).await?;
            return Ok(StateReport::changed(MSG_CREATED, Some(created)));
        }
        Err(e) => return Err(e),
    };

    let merged = overlay(&current, &desired);
    if compare::equal(&current, &merged) {
        Ok(StateReport::unchanged(MSG_ALREADY_PRESENT, Some(current)))
    } else {
        log::debug!("resource '{lookup_name}' differs from the desired state, updating");
        let updated = store.update(&current, &merged).await?;
        Ok(StateReport::changed(MSG_UPDATED, Some(updated)))
    }
}

/// Make sure no resource with this name exists.
pub async fn ensure_absent<S>(store: &S, name: &str) -> OvcResult<StateReport>
where
    S: ResourceStore + Sync,
{
    match store.get_by_name(name).await {
        Ok(current) => {
            store.delete(&current).await?;
            Ok(StateReport::changed(MSG_DELETED, None))
        }
        Err(e) if e.is_not_found() => Ok(StateReport::unchanged(MSG_ALREADY_ABSENT, None)),
        Err(e) => Err(e),
    }
}
