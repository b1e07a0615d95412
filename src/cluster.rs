//! OmniStack cluster operations via the OmniStack REST API.
//!
//! Clusters are read-only from here; the interesting extra is the federation
//! time zone catalogue used when scheduling policy rules.

use serde_json::Value;

use crate::error::{OvcError, OvcResult};
use crate::ovc::OvcClient;
use crate::types::{extract_collection, extract_single, GetAllParams, Resource};

/// Cluster lookup calls backed by [`OvcClient`].
pub struct ClusterManager<'a> {
    client: &'a OvcClient,
}

impl<'a> ClusterManager<'a> {
    pub fn new(client: &'a OvcClient) -> Self {
        Self { client }
    }

    /// List clusters matching the query parameters.
    pub async fn get_all(&self, params: &GetAllParams) -> OvcResult<Vec<Resource>> {
        let body: Value = self
            .client
            .get_with_params("/api/omnistack_clusters", &params.to_query())
            .await?;
        Ok(extract_collection(&body, "omnistack_clusters"))
    }

    /// Fetch one cluster by name, or a `NotFound` error.
    pub async fn get_by_name(&self, name: &str) -> OvcResult<Resource> {
        self.get_all(&GetAllParams::name_filter(name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OvcError::not_found(format!("Cluster '{name}' not found")))
    }

    /// Fetch one cluster by ID.
    pub async fn get_by_id(&self, cluster_id: &str) -> OvcResult<Resource> {
        let body: Value = self
            .client
            .get(&format!("/api/omnistack_clusters/{cluster_id}"))
            .await?;
        extract_single(&body, "omnistack_cluster")
            .ok_or_else(|| OvcError::parse("Malformed cluster envelope"))
    }

    /// List the time zones the federation accepts. The endpoint has shipped
    /// both as a bare array and wrapped in an object, so both shapes parse.
    pub async fn get_time_zone_list(&self) -> OvcResult<Vec<String>> {
        let body: Value = self
            .client
            .get("/api/omnistack_clusters/time_zone_list")
            .await?;
        let entries = match &body {
            Value::Array(entries) => entries.as_slice(),
            Value::Object(map) => match map.get("time_zone_list") {
                Some(Value::Array(entries)) => entries.as_slice(),
                _ => return Err(OvcError::parse("Malformed time zone list")),
            },
            _ => return Err(OvcError::parse("Malformed time zone list")),
        };
        Ok(entries
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect())
    }
}
