//! Backup operations via the OmniStack REST API.

use serde_json::{json, Value};

use crate::error::{OvcError, OvcResult};
use crate::ovc::OvcClient;
use crate::types::{
    extract_collection, extract_single, resource_id, GetAllParams, Resource, TaskEnvelope,
};

/// Backup lookup and lifecycle calls backed by [`OvcClient`].
pub struct BackupManager<'a> {
    client: &'a OvcClient,
}

impl<'a> BackupManager<'a> {
    pub fn new(client: &'a OvcClient) -> Self {
        Self { client }
    }

    // ── List / Get ──────────────────────────────────────────────────

    /// List backups matching the query parameters.
    pub async fn get_all(&self, params: &GetAllParams) -> OvcResult<Vec<Resource>> {
        let body: Value = self
            .client
            .get_with_params("/api/backups", &params.to_query())
            .await?;
        Ok(extract_collection(&body, "backups"))
    }

    /// Fetch one backup by name, or a `NotFound` error.
    pub async fn get_by_name(&self, name: &str) -> OvcResult<Resource> {
        self.get_all(&GetAllParams::name_filter(name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OvcError::not_found(format!("Backup '{name}' not found")))
    }

    /// Fetch one backup by ID.
    pub async fn get_by_id(&self, backup_id: &str) -> OvcResult<Resource> {
        let body: Value = self.client.get(&format!("/api/backups/{backup_id}")).await?;
        extract_single(&body, "backup")
            .ok_or_else(|| OvcError::parse("Malformed backup envelope"))
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Delete a backup. The API only exposes bulk deletion, so this wraps
    /// a single ID in the batch endpoint.
    pub async fn delete(&self, backup: &Resource) -> OvcResult<()> {
        let backup_id = resource_id(backup)
            .ok_or_else(|| OvcError::invalid("Backup resource has no 'id' field"))?;
        let body = json!({ "backup_id": [backup_id] });
        self.client.post_task("/api/backups/delete", &body).await?;
        Ok(())
    }

    /// Rename a backup. Returns the refreshed backup.
    pub async fn rename(&self, backup: &Resource, new_name: &str) -> OvcResult<Resource> {
        let backup_id = resource_id(backup)
            .ok_or_else(|| OvcError::invalid("Backup resource has no 'id' field"))?;
        let body = json!({ "backup_name": new_name });
        self.client
            .post_task(&format!("/api/backups/{backup_id}/rename"), &body)
            .await?;
        self.get_by_id(backup_id).await
    }

    /// Lock a backup so retention cannot expire it. Returns the refreshed
    /// backup.
    pub async fn lock(&self, backup: &Resource) -> OvcResult<Resource> {
        let backup_id = resource_id(backup)
            .ok_or_else(|| OvcError::invalid("Backup resource has no 'id' field"))?;
        let envelope: TaskEnvelope = self
            .client
            .post_empty(&format!("/api/backups/{backup_id}/lock"))
            .await?;
        self.client.wait_for_task(&envelope.task.id).await?;
        self.get_by_id(backup_id).await
    }
}
