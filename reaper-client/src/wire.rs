//! Raw JSON payloads of the Reaper REST API
//!
//! These types mirror `GET /cluster/{name}` as the service sends it. The
//! format is permissive: every field defaults to its zero value when it is
//! missing or `null`, and unknown fields are ignored. Callers normally use
//! the translated [`crate::model::Cluster`] instead.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// `null` decodes like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Full status of a cluster as returned by `GET /cluster/{name}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterStatus {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub jmx_username: String,
    #[serde(rename = "jmx_password_is_set", deserialize_with = "null_as_default")]
    pub jmx_password_set: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub seed_hosts: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub nodes_status: NodesStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodesStatus {
    /// One entry per source node reporting on the cluster
    #[serde(deserialize_with = "null_as_default")]
    pub endpoint_states: Vec<GossipStatus>,
}

/// What one source node reports through gossip
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GossipStatus {
    #[serde(deserialize_with = "null_as_default")]
    pub source_node: String,
    #[serde(deserialize_with = "null_as_default")]
    pub endpoint_names: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub total_load: f64,
    /// datacenter -> rack -> endpoints, in the order the node reported them
    #[serde(alias = "Endpoints", deserialize_with = "null_as_default")]
    pub endpoints: BTreeMap<String, BTreeMap<String, Vec<EndpointStatus>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EndpointStatus {
    #[serde(deserialize_with = "null_as_default")]
    pub endpoint: String,
    #[serde(rename = "dc", deserialize_with = "null_as_default")]
    pub data_center: String,
    #[serde(deserialize_with = "null_as_default")]
    pub rack: String,
    #[serde(deserialize_with = "null_as_default")]
    pub host_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub severity: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub release_version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tokens: String,
    #[serde(deserialize_with = "null_as_default")]
    pub load: f64,
}
