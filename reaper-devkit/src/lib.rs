/*!
# Reaper DevKit - Stubs et Utilitaires de Test

Bibliothèque facilitant les tests du client Reaper avec:
- Stub HTTP du service Reaper, sans déploiement Cassandra
- Injection de pannes et mesure de la concurrence côté serveur
- Builders de payloads `ClusterStatus`
- Harness de test prêt à l'emploi
*/

pub mod reaper_stub;
pub mod payload_builders;
pub mod test_utils;

pub use reaper_stub::{Fault, RecordedRequest, StubReaper};
pub use payload_builders::{endpoint, GossipBuilder, StatusBuilder};
pub use test_utils::{init_tracing, unused_local_url, TestHarness};
