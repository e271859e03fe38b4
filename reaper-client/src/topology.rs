//! Translation of raw status payloads into the topology model
//!
//! source node -> datacenter -> rack -> endpoints becomes
//! cluster -> gossip states -> datacenters -> racks -> endpoints.
//! The translation is total: once the payload decoded, nothing can fail.

use std::collections::BTreeMap;

use crate::model::{Cluster, DataCenterState, EndpointState, GossipState, NodeState, RackState};
use crate::wire::{ClusterStatus, EndpointStatus, GossipStatus};

impl From<ClusterStatus> for Cluster {
    fn from(status: ClusterStatus) -> Self {
        let gossip_states = status
            .nodes_status
            .endpoint_states
            .into_iter()
            .map(GossipState::from)
            .collect();

        Cluster {
            name: status.name,
            jmx_username: status.jmx_username,
            jmx_password_set: status.jmx_password_set,
            seeds: status.seed_hosts,
            node_state: NodeState { gossip_states },
        }
    }
}

impl From<GossipStatus> for GossipState {
    fn from(gossip: GossipStatus) -> Self {
        let datacenters = gossip
            .endpoints
            .into_iter()
            .map(|(dc, racks)| {
                let state = datacenter(dc.clone(), racks);
                (dc, state)
            })
            .collect();

        GossipState {
            source_node: gossip.source_node,
            endpoint_names: gossip.endpoint_names,
            total_load: gossip.total_load,
            datacenters,
        }
    }
}

fn datacenter(name: String, racks: BTreeMap<String, Vec<EndpointStatus>>) -> DataCenterState {
    let racks = racks
        .into_iter()
        .map(|(rack, endpoints)| {
            let state = RackState {
                name: rack.clone(),
                endpoints: endpoints.into_iter().map(EndpointState::from).collect(),
            };
            (rack, state)
        })
        .collect();

    DataCenterState { name, racks }
}

impl From<EndpointStatus> for EndpointState {
    fn from(ep: EndpointStatus) -> Self {
        EndpointState {
            endpoint: ep.endpoint,
            data_center: ep.data_center,
            rack: ep.rack,
            host_id: ep.host_id,
            status: ep.status,
            severity: ep.severity,
            release_version: ep.release_version,
            tokens: ep.tokens,
            load: ep.load,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::NodesStatus;

    fn endpoint(dc: &str, rack: &str, address: &str) -> EndpointStatus {
        EndpointStatus {
            endpoint: address.to_string(),
            data_center: dc.to_string(),
            rack: rack.to_string(),
            host_id: format!("host-{address}"),
            status: "NORMAL".to_string(),
            release_version: "4.1.3".to_string(),
            load: 10.0,
            ..EndpointStatus::default()
        }
    }

    /// K source nodes, datacenters d1 and d2, one rack each, M endpoints per rack
    fn payload(sources: usize, endpoints_per_rack: usize) -> ClusterStatus {
        let endpoint_states = (0..sources)
            .map(|source| {
                let mut endpoints = BTreeMap::new();
                for dc in ["d1", "d2"] {
                    // Reverse order on purpose: translation must not sort endpoints
                    let list = (0..endpoints_per_rack)
                        .rev()
                        .map(|i| endpoint(dc, "r1", &format!("10.{source}.{i}.1")))
                        .collect();
                    endpoints.insert(dc.to_string(), BTreeMap::from([("r1".to_string(), list)]));
                }
                GossipStatus {
                    source_node: format!("source-{source}"),
                    endpoint_names: vec![format!("10.{source}.0.1")],
                    total_load: 20.0 * endpoints_per_rack as f64,
                    endpoints,
                }
            })
            .collect();

        ClusterStatus {
            name: "prod".to_string(),
            jmx_username: "cassandra".to_string(),
            jmx_password_set: true,
            seed_hosts: vec!["10.0.0.1".to_string()],
            nodes_status: NodesStatus { endpoint_states },
        }
    }

    #[test]
    fn test_structure_is_preserved() {
        let raw = payload(3, 4);
        let cluster = Cluster::from(raw.clone());

        assert_eq!(cluster.name, "prod");
        assert_eq!(cluster.jmx_username, "cassandra");
        assert!(cluster.jmx_password_set);
        assert_eq!(cluster.seeds, vec!["10.0.0.1"]);
        assert_eq!(cluster.node_state.gossip_states.len(), 3);

        for (gossip, raw_gossip) in cluster
            .node_state
            .gossip_states
            .iter()
            .zip(&raw.nodes_status.endpoint_states)
        {
            assert_eq!(gossip.source_node, raw_gossip.source_node);
            assert_eq!(gossip.endpoint_count(), 8);
            assert_eq!(
                gossip.datacenters.keys().collect::<Vec<_>>(),
                raw_gossip.endpoints.keys().collect::<Vec<_>>()
            );

            for (dc_name, dc) in &gossip.datacenters {
                assert_eq!(&dc.name, dc_name);
                let rack = &dc.racks["r1"];
                assert_eq!(rack.name, "r1");

                let translated: Vec<&str> =
                    rack.endpoints.iter().map(|e| e.endpoint.as_str()).collect();
                let source: Vec<&str> = raw_gossip.endpoints[dc_name]["r1"]
                    .iter()
                    .map(|e| e.endpoint.as_str())
                    .collect();
                assert_eq!(translated, source);
            }
        }
    }

    #[test]
    fn test_endpoint_fields_are_copied() {
        let cluster = Cluster::from(payload(1, 1));
        let ep = &cluster.node_state.gossip_states[0].datacenters["d2"].racks["r1"].endpoints[0];

        assert_eq!(ep.endpoint, "10.0.0.1");
        assert_eq!(ep.data_center, "d2");
        assert_eq!(ep.rack, "r1");
        assert_eq!(ep.host_id, "host-10.0.0.1");
        assert_eq!(ep.status, "NORMAL");
        assert_eq!(ep.release_version, "4.1.3");
        assert_eq!(ep.load, 10.0);
        assert_eq!(ep.severity, 0.0);
        assert!(ep.tokens.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let cluster = Cluster::from(ClusterStatus::default());
        assert!(cluster.name.is_empty());
        assert!(cluster.node_state.is_empty());
        assert!(cluster.datacenters().is_empty());
    }

    #[test]
    fn test_datacenters_union_across_sources() {
        let mut raw = payload(2, 1);
        raw.nodes_status.endpoint_states[1]
            .endpoints
            .insert("d3".to_string(), BTreeMap::new());

        let cluster = Cluster::from(raw);
        assert_eq!(cluster.datacenters().into_iter().collect::<Vec<_>>(), vec!["d1", "d2", "d3"]);
        assert!(cluster.node_state.gossip_states[1].datacenters["d3"].racks.is_empty());
    }
}
