//! Datastore operations via the OmniStack REST API.
//!
//! Like policies, datastores are fully managed resources: [`DatastoreManager`]
//! implements [`ResourceStore`] for the present/absent reconciliation. After
//! creation the only mutable attribute is capacity, so an update maps to a
//! resize call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cluster::ClusterManager;
use crate::error::{OvcError, OvcResult};
use crate::ovc::OvcClient;
use crate::policy::PolicyManager;
use crate::state::{self, ResourceStore, StateModule, StateReport, MSG_MANDATORY_FIELD_MISSING};
use crate::types::{
    extract_collection, extract_single, resource_id, resource_name, GetAllParams, Resource,
};

/// Datastore calls backed by [`OvcClient`].
pub struct DatastoreManager<'a> {
    client: &'a OvcClient,
}

impl<'a> DatastoreManager<'a> {
    pub fn new(client: &'a OvcClient) -> Self {
        Self { client }
    }

    // ── List / Get ──────────────────────────────────────────────────

    /// List datastores matching the query parameters.
    pub async fn get_all(&self, params: &GetAllParams) -> OvcResult<Vec<Resource>> {
        let body: Value = self
            .client
            .get_with_params("/api/datastores", &params.to_query())
            .await?;
        Ok(extract_collection(&body, "datastores"))
    }

    /// Fetch one datastore by name, or a `NotFound` error.
    pub async fn get_by_name(&self, name: &str) -> OvcResult<Resource> {
        self.get_all(&GetAllParams::name_filter(name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OvcError::not_found(format!("Datastore '{name}' not found")))
    }

    /// Fetch one datastore by ID.
    pub async fn get_by_id(&self, datastore_id: &str) -> OvcResult<Resource> {
        let body: Value = self.client.get(&format!("/api/datastores/{datastore_id}")).await?;
        extract_single(&body, "datastore")
            .ok_or_else(|| OvcError::parse("Malformed datastore envelope"))
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Create a datastore from the desired-state patch. The patch names its
    /// cluster and policy either by ID or by name; names are resolved here.
    /// Returns the new datastore.
    pub async fn create(&self, desired: &Resource) -> OvcResult<Resource> {
        let name = require_name(desired)?.to_string();

        let cluster_id = match desired.get("omnistack_cluster_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let cluster_name = desired
                    .get("omnistack_cluster_name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        OvcError::invalid(
                            "Datastore create requires omnistack_cluster_id or omnistack_cluster_name",
                        )
                    })?;
                let cluster = ClusterManager::new(self.client).get_by_name(cluster_name).await?;
                resource_id(&cluster)
                    .ok_or_else(|| OvcError::parse("Cluster resource has no 'id' field"))?
                    .to_string()
            }
        };

        let policy_id = match desired.get("policy_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let policy_name = desired
                    .get("policy_name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        OvcError::invalid("Datastore create requires policy_id or policy_name")
                    })?;
                let policy = PolicyManager::new(self.client).get_by_name(policy_name).await?;
                resource_id(&policy)
                    .ok_or_else(|| OvcError::parse("Policy resource has no 'id' field"))?
                    .to_string()
            }
        };

        let size = desired
            .get("size")
            .cloned()
            .ok_or_else(|| OvcError::invalid("Datastore create requires a size"))?;

        let body = json!({
            "name": name,
            "omnistack_cluster_id": cluster_id,
            "policy_id": policy_id,
            "size": size,
        });
        let task = self.client.post_task("/api/datastores", &body).await?;
        match task.first_affected_id() {
            Some(datastore_id) => self.get_by_id(datastore_id).await,
            None => self.get_by_name(&name).await,
        }
    }

    /// Resize a datastore. `size` is in bytes. Returns the refreshed
    /// datastore.
    pub async fn resize(&self, datastore: &Resource, size: &Value) -> OvcResult<Resource> {
        let datastore_id = require_id(datastore)?;
        let body = json!({ "size": size });
        self.client
            .post_task(&format!("/api/datastores/{datastore_id}/resize"), &body)
            .await?;
        self.get_by_id(datastore_id).await
    }

    /// Delete a datastore.
    pub async fn delete(&self, datastore: &Resource) -> OvcResult<()> {
        let datastore_id = require_id(datastore)?;
        self.client
            .delete_task(&format!("/api/datastores/{datastore_id}"))
            .await?;
        Ok(())
    }
}

fn require_id(resource: &Resource) -> OvcResult<&str> {
    resource_id(resource).ok_or_else(|| OvcError::invalid("Datastore resource has no 'id' field"))
}

fn require_name(resource: &Resource) -> OvcResult<&str> {
    resource_name(resource)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| OvcError::invalid(MSG_MANDATORY_FIELD_MISSING))
}

#[async_trait]
impl ResourceStore for DatastoreManager<'_> {
    async fn get_by_name(&self, name: &str) -> OvcResult<Resource> {
        DatastoreManager::get_by_name(self, name).await
    }

    async fn create(&self, desired: &Resource) -> OvcResult<Resource> {
        DatastoreManager::create(self, desired).await
    }

    async fn update(&self, current: &Resource, merged: &Resource) -> OvcResult<Resource> {
        match merged.get("size") {
            Some(size) if current.get("size") != Some(size) => self.resize(current, size).await,
            _ => Err(OvcError::invalid("Datastore update supports resize only")),
        }
    }

    async fn delete(&self, current: &Resource) -> OvcResult<()> {
        DatastoreManager::delete(self, current).await
    }
}

// ── Declarative operations ──────────────────────────────────────────────

/// One declarative datastore request: make the described datastore exist, or
/// make sure it does not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum DatastoreOperation {
    Present(Resource),
    Absent(Resource),
}

#[async_trait]
impl StateModule for DatastoreOperation {
    async fn apply(&self, client: &OvcClient) -> OvcResult<StateReport> {
        let datastores = DatastoreManager::new(client);
        match self {
            Self::Present(patch) => state::ensure_present(&datastores, patch).await,
            Self::Absent(patch) => state::ensure_absent(&datastores, require_name(patch)?).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_parses_from_state_and_data() {
        let op: DatastoreOperation = serde_json::from_value(json!({
            "state": "absent",
            "data": {"name": "ds01"}
        }))
        .unwrap();

        match op {
            DatastoreOperation::Absent(patch) => {
                assert_eq!(patch.get("name"), Some(&json!("ds01")));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
