//! Aggregate service facade for the crate.
//!
//! `OvcService` owns the authenticated [`OvcClient`] and hands out the
//! per-resource managers. Connection setup follows the precedence explicit
//! config > config file > environment; each path funnels into
//! [`OvcService::connect`].

use std::path::Path;

use crate::backup::BackupManager;
use crate::cluster::ClusterManager;
use crate::config::OvcConfig;
use crate::datastore::DatastoreManager;
use crate::error::{OvcError, OvcResult};
use crate::facts::{self, FactsQuery};
use crate::host::HostManager;
use crate::ovc::OvcClient;
use crate::policy::PolicyManager;
use crate::state::{StateModule, StateReport};
use crate::types::Resource;
use crate::vm::VmManager;

/// Top-level service that aggregates every OVC subsystem.
pub struct OvcService {
    client: Option<OvcClient>,
    config: Option<OvcConfig>,
}

impl OvcService {
    /// Create a new, disconnected service.
    pub fn new() -> Self {
        Self {
            client: None,
            config: None,
        }
    }

    /// Whether we hold an authenticated OVC session.
    pub fn is_connected(&self) -> bool {
        self.client
            .as_ref()
            .map(|c| c.is_authenticated())
            .unwrap_or(false)
    }

    fn require_client(&self) -> OvcResult<&OvcClient> {
        self.client
            .as_ref()
            .filter(|c| c.is_authenticated())
            .ok_or_else(|| OvcError::connection("Not connected to an OVC. Call connect first."))
    }

    // ── Connection ──────────────────────────────────────────────────

    /// Connect and authenticate against an OVC.
    pub async fn connect(&mut self, config: OvcConfig) -> OvcResult<()> {
        let mut client = OvcClient::new(&config)?;
        client.login().await?;
        self.config = Some(config);
        self.client = Some(client);
        Ok(())
    }

    /// Connect using the `SIMPLIVITYSDK_*` environment variables.
    pub async fn connect_from_environment(&mut self) -> OvcResult<()> {
        let config = OvcConfig::from_environment()?;
        self.connect(config).await
    }

    /// Connect using a JSON config file.
    pub async fn connect_from_file(&mut self, path: impl AsRef<Path>) -> OvcResult<()> {
        let config = OvcConfig::from_json_file(path)?;
        self.connect(config).await
    }

    /// Drop the session. The OAuth token is forgotten locally; the OVC
    /// expires it on its own.
    pub fn disconnect(&mut self) {
        if let Some(ref mut client) = self.client {
            client.logout();
        }
        self.client = None;
        self.config = None;
    }

    /// Current config without the password, safe to log or display.
    pub fn get_config(&self) -> Option<OvcConfigSafe> {
        self.config.as_ref().map(|c| OvcConfigSafe {
            ip: c.ip.clone(),
            username: c.credentials.username.clone(),
            insecure: c.insecure,
            timeout_secs: c.timeout_secs,
        })
    }

    // ── Managers ────────────────────────────────────────────────────

    pub fn virtual_machines(&self) -> OvcResult<VmManager<'_>> {
        Ok(VmManager::new(self.require_client()?))
    }

    pub fn backups(&self) -> OvcResult<BackupManager<'_>> {
        Ok(BackupManager::new(self.require_client()?))
    }

    pub fn datastores(&self) -> OvcResult<DatastoreManager<'_>> {
        Ok(DatastoreManager::new(self.require_client()?))
    }

    pub fn hosts(&self) -> OvcResult<HostManager<'_>> {
        Ok(HostManager::new(self.require_client()?))
    }

    pub fn omnistack_clusters(&self) -> OvcResult<ClusterManager<'_>> {
        Ok(ClusterManager::new(self.require_client()?))
    }

    pub fn policies(&self) -> OvcResult<PolicyManager<'_>> {
        Ok(PolicyManager::new(self.require_client()?))
    }

    // ── Declarative operations ──────────────────────────────────────

    /// Run one declarative operation against the connected OVC.
    pub async fn apply(&self, operation: &(impl StateModule + Sync)) -> OvcResult<StateReport> {
        operation.apply(self.require_client()?).await
    }

    // ── Facts ───────────────────────────────────────────────────────

    pub async fn virtual_machine_facts(&self, query: &FactsQuery) -> OvcResult<Resource> {
        facts::virtual_machine_facts(self.require_client()?, query).await
    }

    pub async fn backup_facts(&self, query: &FactsQuery) -> OvcResult<Resource> {
        facts::backup_facts(self.require_client()?, query).await
    }

    pub async fn datastore_facts(&self, query: &FactsQuery) -> OvcResult<Resource> {
        facts::datastore_facts(self.require_client()?, query).await
    }

    pub async fn host_facts(&self, query: &FactsQuery) -> OvcResult<Resource> {
        facts::host_facts(self.require_client()?, query).await
    }

    pub async fn cluster_facts(&self, query: &FactsQuery) -> OvcResult<Resource> {
        facts::cluster_facts(self.require_client()?, query).await
    }

    pub async fn policy_facts(&self, query: &FactsQuery) -> OvcResult<Resource> {
        facts::policy_facts(self.require_client()?, query).await
    }
}

impl Default for OvcService {
    fn default() -> Self {
        Self::new()
    }
}

/// Config without the password, safe to send beyond the process.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OvcConfigSafe {
    pub ip: String,
    pub username: String,
    pub insecure: bool,
    pub timeout_secs: u64,
}
