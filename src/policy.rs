//! Backup policy operations via the OmniStack REST API.
//!
//! Policies support full lifecycle management, so [`PolicyManager`] also
//! implements [`ResourceStore`] and plugs into the generic present/absent
//! reconciliation. The API has no general update call for policies; the one
//! mutation an update can express is a rename.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{OvcError, OvcResult};
use crate::ovc::OvcClient;
use crate::state::{self, ResourceStore, StateModule, StateReport, MSG_MANDATORY_FIELD_MISSING};
use crate::types::{
    extract_collection, extract_single, resource_id, resource_name, GetAllParams, Resource,
};

/// Backup policy calls backed by [`OvcClient`].
pub struct PolicyManager<'a> {
    client: &'a OvcClient,
}

impl<'a> PolicyManager<'a> {
    pub fn new(client: &'a OvcClient) -> Self {
        Self { client }
    }

    // ── List / Get ──────────────────────────────────────────────────

    /// List policies matching the query parameters.
    pub async fn get_all(&self, params: &GetAllParams) -> OvcResult<Vec<Resource>> {
        let body: Value = self
            .client
            .get_with_params("/api/policies", &params.to_query())
            .await?;
        Ok(extract_collection(&body, "policies"))
    }

    /// Fetch one policy by name, or a `NotFound` error.
    pub async fn get_by_name(&self, name: &str) -> OvcResult<Resource> {
        self.get_all(&GetAllParams::name_filter(name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OvcError::not_found(format!("Policy '{name}' not found")))
    }

    /// Fetch one policy by ID.
    pub async fn get_by_id(&self, policy_id: &str) -> OvcResult<Resource> {
        let body: Value = self.client.get(&format!("/api/policies/{policy_id}")).await?;
        extract_single(&body, "policy")
            .ok_or_else(|| OvcError::parse("Malformed policy envelope"))
    }

    /// List the VMs currently assigned to a policy.
    pub async fn get_vms(&self, policy_id: &str) -> OvcResult<Vec<Resource>> {
        let body: Value = self
            .client
            .get(&format!("/api/policies/{policy_id}/virtual_machines"))
            .await?;
        Ok(extract_collection(&body, "virtual_machines"))
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Create a policy from the desired-state patch. Returns the new policy.
    pub async fn create(&self, desired: &Resource) -> OvcResult<Resource> {
        let name = require_name(desired)?.to_string();
        let body = Value::Object(desired.clone());
        let task = self.client.post_task("/api/policies", &body).await?;
        match task.first_affected_id() {
            Some(policy_id) => self.get_by_id(policy_id).await,
            None => self.get_by_name(&name).await,
        }
    }

    /// Rename a policy. Returns the refreshed policy.
    pub async fn rename(&self, policy: &Resource, new_name: &str) -> OvcResult<Resource> {
        let policy_id = require_id(policy)?;
        let body = json!({ "name": new_name });
        self.client
            .post_task(&format!("/api/policies/{policy_id}/rename"), &body)
            .await?;
        self.get_by_id(policy_id).await
    }

    /// Delete a policy. Fails while VMs or datastores still use it.
    pub async fn delete(&self, policy: &Resource) -> OvcResult<()> {
        let policy_id = require_id(policy)?;
        self.client
            .delete_task(&format!("/api/policies/{policy_id}"))
            .await?;
        Ok(())
    }
}

fn require_id(resource: &Resource) -> OvcResult<&str> {
    resource_id(resource).ok_or_else(|| OvcError::invalid("Policy resource has no 'id' field"))
}

fn require_name(resource: &Resource) -> OvcResult<&str> {
    resource_name(resource)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| OvcError::invalid(MSG_MANDATORY_FIELD_MISSING))
}

#[async_trait]
impl ResourceStore for PolicyManager<'_> {
    async fn get_by_name(&self, name: &str) -> OvcResult<Resource> {
        PolicyManager::get_by_name(self, name).await
    }

    async fn create(&self, desired: &Resource) -> OvcResult<Resource> {
        PolicyManager::create(self, desired).await
    }

    async fn update(&self, current: &Resource, merged: &Resource) -> OvcResult<Resource> {
        let new_name = require_name(merged)?;
        if resource_name(current) == Some(new_name) {
            return Err(OvcError::invalid("Policy update supports rename only"));
        }
        self.rename(current, new_name).await
    }

    async fn delete(&self, current: &Resource) -> OvcResult<()> {
        PolicyManager::delete(self, current).await
    }
}

// ── Declarative operations ──────────────────────────────────────────────

/// One declarative policy request: make the described policy exist, or make
/// sure it does not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum PolicyOperation {
    Present(Resource),
    Absent(Resource),
}

#[async_trait]
impl StateModule for PolicyOperation {
    async fn apply(&self, client: &OvcClient) -> OvcResult<StateReport> {
        let policies = PolicyManager::new(client);
        match self {
            Self::Present(patch) => state::ensure_present(&policies, patch).await,
            Self::Absent(patch) => state::ensure_absent(&policies, require_name(patch)?).await,
        }
    }
}
