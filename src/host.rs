//! Host operations via the OmniStack REST API.

use serde_json::Value;

use crate::error::{OvcError, OvcResult};
use crate::ovc::OvcClient;
use crate::types::{
    extract_collection, extract_single, resource_id, GetAllParams, Resource, TaskEnvelope,
};

/// Host lookup and federation calls backed by [`OvcClient`].
pub struct HostManager<'a> {
    client: &'a OvcClient,
}

impl<'a> HostManager<'a> {
    pub fn new(client: &'a OvcClient) -> Self {
        Self { client }
    }

    // ── List / Get ──────────────────────────────────────────────────

    /// List hosts matching the query parameters.
    pub async fn get_all(&self, params: &GetAllParams) -> OvcResult<Vec<Resource>> {
        let body: Value = self
            .client
            .get_with_params("/api/hosts", &params.to_query())
            .await?;
        Ok(extract_collection(&body, "hosts"))
    }

    /// Fetch one host by name, or a `NotFound` error.
    pub async fn get_by_name(&self, name: &str) -> OvcResult<Resource> {
        self.get_all(&GetAllParams::name_filter(name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OvcError::not_found(format!("Host '{name}' not found")))
    }

    /// Fetch one host by ID.
    pub async fn get_by_id(&self, host_id: &str) -> OvcResult<Resource> {
        let body: Value = self.client.get(&format!("/api/hosts/{host_id}")).await?;
        extract_single(&body, "host").ok_or_else(|| OvcError::parse("Malformed host envelope"))
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Remove a host from its federation. The host must be empty.
    pub async fn remove_from_federation(&self, host: &Resource) -> OvcResult<()> {
        let host_id = resource_id(host)
            .ok_or_else(|| OvcError::invalid("Host resource has no 'id' field"))?;
        let envelope: TaskEnvelope = self
            .client
            .post_empty(&format!("/api/hosts/{host_id}/remove_from_federation"))
            .await?;
        self.client.wait_for_task(&envelope.task.id).await?;
        Ok(())
    }
}
