/*!
Builders de payloads Reaper pour tests

Construit des `ClusterStatus` réalistes sans écrire le JSON à la main:
- `StatusBuilder` pour le statut complet d'un cluster
- `GossipBuilder` pour ce qu'un noeud source rapporte
- `endpoint()` pour un noeud individuel
*/

use reaper_client::wire::{ClusterStatus, EndpointStatus, GossipStatus};
use serde_json::Value;

/// Noeud Cassandra "sain" avec des valeurs plausibles
pub fn endpoint(dc: &str, rack: &str, address: &str) -> EndpointStatus {
    EndpointStatus {
        endpoint: address.to_string(),
        data_center: dc.to_string(),
        rack: rack.to_string(),
        host_id: format!("host-{address}"),
        status: "NORMAL".to_string(),
        severity: 0.0,
        release_version: "4.1.3".to_string(),
        tokens: "-9223372036854775808".to_string(),
        load: 1024.0,
    }
}

/// Builder pour la vue gossip d'un noeud source
#[derive(Debug, Clone)]
pub struct GossipBuilder {
    gossip: GossipStatus,
}

impl GossipBuilder {
    pub fn new(source_node: &str) -> Self {
        Self {
            gossip: GossipStatus {
                source_node: source_node.to_string(),
                ..GossipStatus::default()
            },
        }
    }

    /// Range l'endpoint sous son datacenter et son rack, à la suite des précédents
    pub fn endpoint(mut self, endpoint: EndpointStatus) -> Self {
        self.gossip.endpoint_names.push(endpoint.endpoint.clone());
        self.gossip.total_load += endpoint.load;
        self.gossip
            .endpoints
            .entry(endpoint.data_center.clone())
            .or_default()
            .entry(endpoint.rack.clone())
            .or_default()
            .push(endpoint);
        self
    }

    /// Datacenter déclaré sans aucun rack
    pub fn empty_datacenter(mut self, dc: &str) -> Self {
        self.gossip.endpoints.entry(dc.to_string()).or_default();
        self
    }

    pub fn build(self) -> GossipStatus {
        self.gossip
    }
}

/// Builder pour `GET /cluster/{name}`
#[derive(Debug, Clone)]
pub struct StatusBuilder {
    status: ClusterStatus,
}

impl StatusBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            status: ClusterStatus {
                name: name.to_string(),
                ..ClusterStatus::default()
            },
        }
    }

    pub fn jmx_username(mut self, username: &str) -> Self {
        self.status.jmx_username = username.to_string();
        self
    }

    pub fn jmx_password_set(mut self, set: bool) -> Self {
        self.status.jmx_password_set = set;
        self
    }

    pub fn seed(mut self, host: &str) -> Self {
        self.status.seed_hosts.push(host.to_string());
        self
    }

    pub fn gossip(mut self, gossip: GossipStatus) -> Self {
        self.status.nodes_status.endpoint_states.push(gossip);
        self
    }

    /// Topologie homogène: chaque noeud source voit les mêmes endpoints.
    ///
    /// Racks nommés `rack1..`, adresses `10.{dc}.{rack}.{n}`.
    pub fn uniform(
        mut self,
        sources: usize,
        datacenters: &[&str],
        racks_per_dc: usize,
        endpoints_per_rack: usize,
    ) -> Self {
        for source in 0..sources {
            let mut gossip = GossipBuilder::new(&format!("10.0.0.{}", source + 1));
            for (d, dc) in datacenters.iter().enumerate() {
                for r in 0..racks_per_dc {
                    let rack = format!("rack{}", r + 1);
                    for n in 0..endpoints_per_rack {
                        gossip = gossip.endpoint(endpoint(dc, &rack, &format!("10.{d}.{r}.{n}")));
                    }
                }
            }
            self = self.gossip(gossip.build());
        }
        self
    }

    pub fn build(self) -> ClusterStatus {
        self.status
    }

    /// JSON tel que le service l'envoie
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.status).unwrap_or(Value::Null)
    }
}
