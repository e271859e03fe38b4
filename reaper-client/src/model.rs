//! Cluster topology as seen by the repair service
//!
//! All types are immutable value objects: they are built once by the
//! topology translator and only read afterwards.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::ClientError;

/// A cluster managed by Reaper
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub name: String,
    pub jmx_username: String,
    /// Whether a JMX password is configured. The password itself never leaves the service.
    pub jmx_password_set: bool,
    pub seeds: Vec<String>,
    pub node_state: NodeState,
}

impl Cluster {
    /// Datacenter names reported by any source node
    pub fn datacenters(&self) -> BTreeSet<&str> {
        self.node_state
            .gossip_states
            .iter()
            .flat_map(|gossip| gossip.datacenters.keys().map(String::as_str))
            .collect()
    }
}

/// One gossip state per source node reporting on the cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeState {
    pub gossip_states: Vec<GossipState>,
}

impl NodeState {
    pub fn is_empty(&self) -> bool {
        self.gossip_states.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GossipState {
    pub source_node: String,
    pub endpoint_names: Vec<String>,
    pub total_load: f64,
    pub datacenters: BTreeMap<String, DataCenterState>,
}

impl GossipState {
    pub fn endpoint_count(&self) -> usize {
        self.datacenters
            .values()
            .flat_map(|dc| dc.racks.values())
            .map(|rack| rack.endpoints.len())
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataCenterState {
    pub name: String,
    pub racks: BTreeMap<String, RackState>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RackState {
    pub name: String,
    /// Same order as the source payload
    pub endpoints: Vec<EndpointState>,
}

/// Observed state of a single node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointState {
    pub endpoint: String,
    pub data_center: String,
    pub rack: String,
    pub host_id: String,
    pub status: String,
    pub severity: f64,
    pub release_version: String,
    /// Token ring position, free-form as reported
    pub tokens: String,
    pub load: f64,
}

/// Unit flowing through a fan-out stream
#[derive(Debug)]
pub enum FetchResult {
    Fetched(Cluster),
    /// Fetching this cluster failed; siblings are unaffected
    Failed { cluster: String, error: ClientError },
    /// The cluster list itself could not be fetched, nothing was launched
    ListingFailed(ClientError),
}

impl FetchResult {
    pub fn cluster_name(&self) -> Option<&str> {
        match self {
            FetchResult::Fetched(cluster) => Some(&cluster.name),
            FetchResult::Failed { cluster, .. } => Some(cluster),
            FetchResult::ListingFailed(_) => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, FetchResult::Fetched(_))
    }

    pub fn error(&self) -> Option<&ClientError> {
        match self {
            FetchResult::Fetched(_) => None,
            FetchResult::Failed { error, .. } | FetchResult::ListingFailed(error) => Some(error),
        }
    }

    pub fn into_result(self) -> Result<Cluster, ClientError> {
        match self {
            FetchResult::Fetched(cluster) => Ok(cluster),
            FetchResult::Failed { error, .. } | FetchResult::ListingFailed(error) => Err(error),
        }
    }
}
