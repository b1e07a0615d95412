//! Virtual machine operations via the OmniStack REST API.
//!
//! Covers lookup, clone, move-to-datastore, on-demand backup, guest backup
//! parameters, and policy assignment for one VM or a batch. [`VmOperation`]
//! is the declarative entry point; each variant reproduces the
//! changed/message decision of the matching imperative workflow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backup::BackupManager;
use crate::cluster::ClusterManager;
use crate::datastore::DatastoreManager;
use crate::error::{OvcError, OvcResult};
use crate::ovc::OvcClient;
use crate::policy::PolicyManager;
use crate::state::{StateModule, StateReport};
use crate::types::{extract_collection, extract_single, resource_id, GetAllParams, Resource};

pub const MSG_CLONED: &str = "Cloned successfully.";
pub const MSG_VM_WITH_SAME_NAME_EXISTS: &str = "VM with the same name already exists.";
pub const MSG_MOVED: &str = "Moved VM to datastore successfully";
pub const MSG_BACKUP_CREATED: &str = "Created backup successfully";
pub const MSG_BACKUP_EXISTS: &str = "Backup exists with the same name";
pub const MSG_SET_BACKUP_PARAMETERS: &str = "Successfully set the backup parameters";
pub const MSG_SET_VM_POLICY: &str = "Successfully set the VM policy";
pub const MSG_VM_POLICY_ALREADY_APPLIED: &str = "Policy has already been applied to this VM";
pub const MSG_UPDATED_POLICY_OF_MULTIPLE_VMS: &str = "Updated policy of the VMs successfully.";
pub const MSG_POLICY_ALREADY_APPLIED: &str =
    "Policy has already been applied to all of the requested VMs.";

/// High-level virtual machine operations backed by [`OvcClient`].
pub struct VmManager<'a> {
    client: &'a OvcClient,
}

impl<'a> VmManager<'a> {
    pub fn new(client: &'a OvcClient) -> Self {
        Self { client }
    }

    // ── List / Get ──────────────────────────────────────────────────

    /// List VMs matching the query parameters.
    pub async fn get_all(&self, params: &GetAllParams) -> OvcResult<Vec<Resource>> {
        let body: Value = self
            .client
            .get_with_params("/api/virtual_machines", &params.to_query())
            .await?;
        Ok(extract_collection(&body, "virtual_machines"))
    }

    /// Fetch one VM by name, or a `NotFound` error.
    pub async fn get_by_name(&self, name: &str) -> OvcResult<Resource> {
        self.get_all(&GetAllParams::name_filter(name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OvcError::not_found(format!("Virtual machine '{name}' not found")))
    }

    /// Fetch one VM by ID.
    pub async fn get_by_id(&self, vm_id: &str) -> OvcResult<Resource> {
        let body: Value = self.client.get(&format!("/api/virtual_machines/{vm_id}")).await?;
        extract_single(&body, "virtual_machine")
            .ok_or_else(|| OvcError::parse("Malformed virtual machine envelope"))
    }

    /// List the backups of one VM.
    pub async fn get_backups(&self, vm_id: &str) -> OvcResult<Vec<Resource>> {
        let body: Value = self
            .client
            .get(&format!("/api/virtual_machines/{vm_id}/backups"))
            .await?;
        Ok(extract_collection(&body, "backups"))
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Clone a VM, optionally moving the clone onto another datastore.
    /// Returns the cloned VM.
    pub async fn clone_vm(
        &self,
        vm: &Resource,
        new_vm_name: &str,
        app_consistent: bool,
        datastore_name: Option<&str>,
    ) -> OvcResult<Resource> {
        let vm_id = require_id(vm)?;
        let body = json!({
            "virtual_machine_name": new_vm_name,
            "app_consistent": app_consistent,
        });
        self.client
            .post_task(&format!("/api/virtual_machines/{vm_id}/clone"), &body)
            .await?;

        let cloned = self.get_by_name(new_vm_name).await?;
        match datastore_name {
            Some(datastore) => self.move_to_datastore(&cloned, new_vm_name, datastore).await,
            None => Ok(cloned),
        }
    }

    /// Move a VM onto another datastore. Returns the moved VM.
    pub async fn move_to_datastore(
        &self,
        vm: &Resource,
        new_vm_name: &str,
        datastore_name: &str,
    ) -> OvcResult<Resource> {
        let vm_id = require_id(vm)?;
        let datastore = DatastoreManager::new(self.client).get_by_name(datastore_name).await?;
        let body = json!({
            "virtual_machine_name": new_vm_name,
            "destination_datastore_id": require_id(&datastore)?,
        });
        self.client
            .post_task(&format!("/api/virtual_machines/{vm_id}/move"), &body)
            .await?;
        self.get_by_name(new_vm_name).await
    }

    /// Take an on-demand backup of a VM. `retention` is in minutes; zero
    /// means keep forever. Returns the backup.
    pub async fn create_backup(
        &self,
        vm: &Resource,
        backup_name: &str,
        cluster_name: Option<&str>,
        app_consistent: bool,
        consistency_type: Option<&str>,
        retention: u32,
    ) -> OvcResult<Resource> {
        let vm_id = require_id(vm)?;

        // Destination cluster defaults to wherever the VM lives.
        let destination_id = match cluster_name {
            Some(cluster_name) => {
                let cluster = ClusterManager::new(self.client).get_by_name(cluster_name).await?;
                Some(require_id(&cluster)?.to_string())
            }
            None => None,
        };

        let body = json!({
            "backup_name": backup_name,
            "destination_id": destination_id,
            "app_consistent": app_consistent,
            "consistency_type": consistency_type,
            "retention": retention,
        });
        let task = self
            .client
            .post_task(&format!("/api/virtual_machines/{vm_id}/backup"), &body)
            .await?;

        let backups = BackupManager::new(self.client);
        match task.first_affected_id() {
            Some(backup_id) => backups.get_by_id(backup_id).await,
            None => backups.get_by_name(backup_name).await,
        }
    }

    /// Set the guest credentials used for application-consistent backups.
    /// Returns the refreshed VM.
    pub async fn set_backup_parameters(
        &self,
        vm: &Resource,
        guest_username: &str,
        guest_password: &str,
        override_validation: bool,
        app_aware_type: Option<&str>,
    ) -> OvcResult<Resource> {
        let vm_id = require_id(vm)?;
        let body = json!({
            "guest_username": guest_username,
            "guest_password": guest_password,
            "override_validation": override_validation,
            "app_aware_type": app_aware_type,
        });
        self.client
            .post_task(&format!("/api/virtual_machines/{vm_id}/backup_parameters"), &body)
            .await?;
        self.get_by_id(vm_id).await
    }

    /// Assign a backup policy to one VM. Returns the refreshed VM.
    pub async fn set_policy(&self, vm: &Resource, policy_id: &str) -> OvcResult<Resource> {
        let vm_id = require_id(vm)?;
        self.set_policy_for_multiple_vms(policy_id, &[vm_id]).await?;
        self.get_by_id(vm_id).await
    }

    /// Assign a backup policy to a batch of VMs in one call.
    pub async fn set_policy_for_multiple_vms(
        &self,
        policy_id: &str,
        vm_ids: &[&str],
    ) -> OvcResult<()> {
        let body = json!({
            "policy_id": policy_id,
            "virtual_machine_id": vm_ids,
        });
        self.client
            .post_task("/api/virtual_machines/set_policy", &body)
            .await?;
        Ok(())
    }
}

fn require_id(resource: &Resource) -> OvcResult<&str> {
    resource_id(resource).ok_or_else(|| OvcError::invalid("Resource has no 'id' field"))
}

// ── Declarative operations ──────────────────────────────────────────────

/// One declarative VM request. VMs are not created or deleted through the
/// OVC, so instead of present/absent this enumerates the supported
/// workflows, each with its statically-typed parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum VmOperation {
    /// Clone `name` as `new_name`, optionally onto another datastore.
    Clone {
        name: String,
        new_name: String,
        #[serde(default)]
        app_consistent: bool,
        #[serde(default)]
        datastore: Option<String>,
    },
    /// Move `name` to `datastore_name`, renaming it to `new_name`.
    Move {
        name: String,
        new_name: String,
        datastore_name: String,
    },
    /// Take an on-demand backup of `name`.
    Backup {
        name: String,
        backup_name: String,
        #[serde(default)]
        cluster_name: Option<String>,
        #[serde(default)]
        app_consistent: bool,
        #[serde(default)]
        consistency_type: Option<String>,
        #[serde(default)]
        retention: u32,
    },
    /// Store guest credentials for application-consistent backups.
    SetBackupParameters {
        name: String,
        guest_username: String,
        guest_password: String,
        #[serde(default)]
        override_validation: bool,
        #[serde(default)]
        app_aware_type: Option<String>,
    },
    /// Put one VM on a backup policy.
    SetPolicy { name: String, policy_name: String },
    /// Put a batch of VMs on a backup policy, skipping those already on it.
    SetPolicyForMultipleVms {
        vm_names: Vec<String>,
        policy_name: String,
    },
}

#[async_trait]
impl StateModule for VmOperation {
    async fn apply(&self, client: &OvcClient) -> OvcResult<StateReport> {
        let vms = VmManager::new(client);

        match self {
            Self::Clone { name, new_name, app_consistent, datastore } => {
                let vm = vms.get_by_name(name).await?;
                match vms.get_by_name(new_name).await {
                    Ok(_) => Ok(StateReport::unchanged(MSG_VM_WITH_SAME_NAME_EXISTS, None)),
                    Err(e) if e.is_not_found() => {
                        let cloned = vms
                            .clone_vm(&vm, new_name, *app_consistent, datastore.as_deref())
                            .await?;
                        Ok(StateReport::changed(MSG_CLONED, Some(cloned)))
                    }
                    Err(e) => Err(e),
                }
            }

            Self::Move { name, new_name, datastore_name } => {
                let vm = vms.get_by_name(name).await?;
                // Occupied destination: a VM with the target name already
                // on the target datastore means nothing to do.
                let mut params = GetAllParams::name_filter(new_name);
                params
                    .filters
                    .insert("datastore_name".to_string(), datastore_name.clone());
                if !vms.get_all(&params).await?.is_empty() {
                    return Ok(StateReport::unchanged(MSG_VM_WITH_SAME_NAME_EXISTS, None));
                }
                let moved = vms.move_to_datastore(&vm, new_name, datastore_name).await?;
                Ok(StateReport::changed(MSG_MOVED, Some(moved)))
            }

            Self::Backup {
                name,
                backup_name,
                cluster_name,
                app_consistent,
                consistency_type,
                retention,
            } => {
                let vm = vms.get_by_name(name).await?;
                let backups = BackupManager::new(client);
                match backups.get_by_name(backup_name).await {
                    Ok(_) => Ok(StateReport::unchanged(MSG_BACKUP_EXISTS, None)),
                    Err(e) if e.is_not_found() => {
                        let backup = vms
                            .create_backup(
                                &vm,
                                backup_name,
                                cluster_name.as_deref(),
                                *app_consistent,
                                consistency_type.as_deref(),
                                *retention,
                            )
                            .await?;
                        Ok(StateReport::changed(MSG_BACKUP_CREATED, Some(backup)))
                    }
                    Err(e) => Err(e),
                }
            }

            Self::SetBackupParameters {
                name,
                guest_username,
                guest_password,
                override_validation,
                app_aware_type,
            } => {
                let vm = vms.get_by_name(name).await?;
                let refreshed = vms
                    .set_backup_parameters(
                        &vm,
                        guest_username,
                        guest_password,
                        *override_validation,
                        app_aware_type.as_deref(),
                    )
                    .await?;
                Ok(StateReport::changed(MSG_SET_BACKUP_PARAMETERS, Some(refreshed)))
            }

            Self::SetPolicy { name, policy_name } => {
                let policies = PolicyManager::new(client);
                let vm = vms.get_by_name(name).await?;
                let vm_id = require_id(&vm)?;
                let policy = policies.get_by_name(policy_name).await?;
                let policy_id = require_id(&policy)?;

                let on_policy = policies.get_vms(policy_id).await?;
                if on_policy.iter().any(|r| resource_id(r) == Some(vm_id)) {
                    return Ok(StateReport::unchanged(MSG_VM_POLICY_ALREADY_APPLIED, None));
                }
                let refreshed = vms.set_policy(&vm, policy_id).await?;
                Ok(StateReport::changed(MSG_SET_VM_POLICY, Some(refreshed)))
            }

            Self::SetPolicyForMultipleVms { vm_names, policy_name } => {
                let policies = PolicyManager::new(client);
                let policy = policies.get_by_name(policy_name).await?;
                let policy_id = require_id(&policy)?;

                let mut resolved = Vec::with_capacity(vm_names.len());
                for vm_name in vm_names {
                    resolved.push(vms.get_by_name(vm_name).await?);
                }

                let on_policy = policies.get_vms(policy_id).await?;
                let covered: Vec<&str> = on_policy.iter().filter_map(resource_id).collect();
                let pending: Vec<&Resource> = resolved
                    .iter()
                    .filter(|vm| matches!(resource_id(vm), Some(id) if !covered.contains(&id)))
                    .collect();

                let updated_names: Vec<Value> =
                    pending.iter().filter_map(|vm| vm.get("name").cloned()).collect();
                let mut fact = Resource::new();
                fact.insert("policy_updated_vms".to_string(), Value::Array(updated_names));

                if pending.is_empty() {
                    return Ok(StateReport::unchanged(MSG_POLICY_ALREADY_APPLIED, Some(fact)));
                }
                let ids: Vec<&str> = pending.iter().filter_map(|vm| resource_id(vm)).collect();
                vms.set_policy_for_multiple_vms(policy_id, &ids).await?;
                Ok(StateReport::changed(MSG_UPDATED_POLICY_OF_MULTIPLE_VMS, Some(fact)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clone_operation_parses_with_defaults() {
        let op: VmOperation = serde_json::from_value(json!({
            "state": "clone",
            "data": {"name": "vm1", "new_name": "vm2"}
        }))
        .unwrap();

        assert_eq!(
            op,
            VmOperation::Clone {
                name: "vm1".to_string(),
                new_name: "vm2".to_string(),
                app_consistent: false,
                datastore: None,
            }
        );
    }

    #[test]
    fn backup_operation_parses() {
        let op: VmOperation = serde_json::from_value(json!({
            "state": "backup",
            "data": {
                "name": "vm1",
                "backup_name": "nightly",
                "cluster_name": "cluster-a",
                "app_consistent": true,
                "retention": 1440
            }
        }))
        .unwrap();

        match op {
            VmOperation::Backup { name, backup_name, cluster_name, app_consistent, retention, .. } => {
                assert_eq!(name, "vm1");
                assert_eq!(backup_name, "nightly");
                assert_eq!(cluster_name.as_deref(), Some("cluster-a"));
                assert!(app_consistent);
                assert_eq!(retention, 1440);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn batch_policy_operation_parses() {
        let op: VmOperation = serde_json::from_value(json!({
            "state": "set_policy_for_multiple_vms",
            "data": {"vm_names": ["vm1", "vm2"], "policy_name": "gold"}
        }))
        .unwrap();

        assert_eq!(
            op,
            VmOperation::SetPolicyForMultipleVms {
                vm_names: vec!["vm1".to_string(), "vm2".to_string()],
                policy_name: "gold".to_string(),
            }
        );
    }

    #[test]
    fn move_operation_requires_datastore() {
        let result: Result<VmOperation, _> = serde_json::from_value(json!({
            "state": "move",
            "data": {"name": "vm1", "new_name": "vm1"}
        }));
        assert!(result.is_err());
    }
}
