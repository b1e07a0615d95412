//! Read-only fact gathering for every resource kind.
//!
//! Each function answers one query and returns a facts map keyed by the
//! resource's fact name, holding a list of raw resources. A query by name
//! yields a zero-or-one-element list rather than an error, so callers can
//! probe for existence without handling `NotFound`.

use serde_json::{Map, Value};

use crate::backup::BackupManager;
use crate::cluster::ClusterManager;
use crate::compare;
use crate::datastore::DatastoreManager;
use crate::error::OvcResult;
use crate::host::HostManager;
use crate::ovc::OvcClient;
use crate::policy::PolicyManager;
use crate::types::{resource_id, GetAllParams, Resource};
use crate::vm::VmManager;

/// Parameters of one facts query.
#[derive(Debug, Clone, Default)]
pub struct FactsQuery {
    /// Restrict the query to one resource by exact name.
    pub name: Option<String>,
    /// Listing parameters, used when `name` is not set.
    pub params: GetAllParams,
    /// Option switches, e.g. `backups` on the virtual machine query.
    pub options: Map<String, Value>,
}

impl FactsQuery {
    /// Query one resource by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Query a filtered, paginated listing.
    pub fn listing(params: GetAllParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }

    /// Whether an option switch is present and truthy.
    pub fn wants(&self, option: &str) -> bool {
        self.options.get(option).map_or(false, compare::truthy)
    }
}

/// Fold a list of option entries into one map: string entries become
/// `true`-valued switches, mapping entries merge in, anything else keys on
/// its printed form.
pub fn options_to_map(entries: &[Value]) -> Map<String, Value> {
    let mut options = Map::new();
    for entry in entries {
        match entry {
            Value::Object(fields) => {
                for (key, value) in fields {
                    options.insert(key.clone(), value.clone());
                }
            }
            Value::String(name) => {
                options.insert(name.clone(), Value::Bool(true));
            }
            other => {
                options.insert(other.to_string(), Value::Bool(true));
            }
        }
    }
    options
}

fn resource_list(resources: Vec<Resource>) -> Value {
    Value::Array(resources.into_iter().map(Value::Object).collect())
}

// ── Per-resource queries ────────────────────────────────────────────────

/// Gather virtual machine facts under `virtual_machines`. With the
/// `backups` option and a named VM that exists, its backups land under a
/// second `backups` key.
pub async fn virtual_machine_facts(client: &OvcClient, query: &FactsQuery) -> OvcResult<Resource> {
    let vms = VmManager::new(client);
    let mut facts = Resource::new();

    match &query.name {
        Some(name) => match vms.get_by_name(name).await {
            Ok(vm) => {
                if query.wants("backups") {
                    if let Some(vm_id) = resource_id(&vm) {
                        let backups = vms.get_backups(vm_id).await?;
                        facts.insert("backups".to_string(), resource_list(backups));
                    }
                }
                facts.insert("virtual_machines".to_string(), resource_list(vec![vm]));
            }
            Err(e) if e.is_not_found() => {
                facts.insert("virtual_machines".to_string(), resource_list(Vec::new()));
            }
            Err(e) => return Err(e),
        },
        None => {
            let all = vms.get_all(&query.params).await?;
            facts.insert("virtual_machines".to_string(), resource_list(all));
        }
    }
    Ok(facts)
}

/// Gather backup facts under `backups`.
pub async fn backup_facts(client: &OvcClient, query: &FactsQuery) -> OvcResult<Resource> {
    let backups = BackupManager::new(client);
    let mut facts = Resource::new();

    let listed = match &query.name {
        Some(name) => match backups.get_by_name(name).await {
            Ok(backup) => vec![backup],
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        },
        None => backups.get_all(&query.params).await?,
    };
    facts.insert("backups".to_string(), resource_list(listed));
    Ok(facts)
}

/// Gather datastore facts under `datastores`.
pub async fn datastore_facts(client: &OvcClient, query: &FactsQuery) -> OvcResult<Resource> {
    let datastores = DatastoreManager::new(client);
    let mut facts = Resource::new();

    let listed = match &query.name {
        Some(name) => match datastores.get_by_name(name).await {
            Ok(datastore) => vec![datastore],
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        },
        None => datastores.get_all(&query.params).await?,
    };
    facts.insert("datastores".to_string(), resource_list(listed));
    Ok(facts)
}

/// Gather host facts under `hosts`.
pub async fn host_facts(client: &OvcClient, query: &FactsQuery) -> OvcResult<Resource> {
    let hosts = HostManager::new(client);
    let mut facts = Resource::new();

    let listed = match &query.name {
        Some(name) => match hosts.get_by_name(name).await {
            Ok(host) => vec![host],
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        },
        None => hosts.get_all(&query.params).await?,
    };
    facts.insert("hosts".to_string(), resource_list(listed));
    Ok(facts)
}

/// Gather cluster facts under `clusters`.
pub async fn cluster_facts(client: &OvcClient, query: &FactsQuery) -> OvcResult<Resource> {
    let clusters = ClusterManager::new(client);
    let mut facts = Resource::new();

    let listed = match &query.name {
        Some(name) => match clusters.get_by_name(name).await {
            Ok(cluster) => vec![cluster],
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        },
        None => clusters.get_all(&query.params).await?,
    };
    facts.insert("clusters".to_string(), resource_list(listed));
    Ok(facts)
}

/// Gather policy facts under `policies`.
pub async fn policy_facts(client: &OvcClient, query: &FactsQuery) -> OvcResult<Resource> {
    let policies = PolicyManager::new(client);
    let mut facts = Resource::new();

    let listed = match &query.name {
        Some(name) => match policies.get_by_name(name).await {
            Ok(policy) => vec![policy],
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        },
        None => policies.get_all(&query.params).await?,
    };
    facts.insert("policies".to_string(), resource_list(listed));
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn options_fold_strings_and_mappings() {
        let entries = vec![json!("backups"), json!({"limit": 5, "fields": "name,id"})];

        let options = options_to_map(&entries);

        assert_eq!(options.get("backups"), Some(&json!(true)));
        assert_eq!(options.get("limit"), Some(&json!(5)));
        assert_eq!(options.get("fields"), Some(&json!("name,id")));
    }

    #[test]
    fn options_later_entries_win() {
        let entries = vec![json!({"limit": 5}), json!({"limit": 10})];
        assert_eq!(options_to_map(&entries).get("limit"), Some(&json!(10)));
    }

    #[test]
    fn options_key_other_scalars_on_printed_form() {
        let options = options_to_map(&[json!(7), json!(true)]);
        assert_eq!(options.get("7"), Some(&json!(true)));
        assert_eq!(options.get("true"), Some(&json!(true)));
    }

    #[test]
    fn wants_requires_a_truthy_switch() {
        let query = FactsQuery::named("vm1").with_options(options_to_map(&[json!("backups")]));
        assert!(query.wants("backups"));
        assert!(!query.wants("snapshots"));

        let off = FactsQuery::named("vm1")
            .with_options(options_to_map(&[json!({"backups": false})]));
        assert!(!off.wants("backups"));
    }

    #[test]
    fn resource_list_preserves_objects() {
        let vm = json!({"id": "1", "name": "vm1"}).as_object().cloned().unwrap();
        assert_eq!(resource_list(vec![vm]), json!([{"id": "1", "name": "vm1"}]));
    }
}
