//! Reaper Client - client library for the Cassandra Reaper repair service
//!
//! Provides:
//! - Cluster listing, lookup, registration and removal over the Reaper REST API
//! - Translation of the raw status payload into a cluster -> datacenter -> rack -> endpoint model
//! - Bounded, cancellable fan-out over every registered cluster, as a live
//!   stream or as a fail-fast collection
//!
//! ```no_run
//! use reaper_client::{Cancellation, ClientConfig, ReaperClient};
//! use std::time::Duration;
//!
//! # async fn run() -> reaper_client::Result<()> {
//! let client = ReaperClient::new(ClientConfig::new("http://reaper:8080"))?;
//! let cancel = Cancellation::with_timeout(Duration::from_secs(30));
//!
//! for cluster in client.fetch_clusters(&cancel).await? {
//!     println!("{}: {} source nodes", cluster.name, cluster.node_state.gossip_states.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod fanout;
pub mod model;
pub mod topology;
pub mod transport;
pub mod wire;

pub use cancel::{CancelReason, Cancellation};
pub use client::ReaperClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use fanout::ClusterStream;
pub use model::{
    Cluster, DataCenterState, EndpointState, FetchResult, GossipState, NodeState, RackState,
};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
