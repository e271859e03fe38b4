//! Single-resource operations of the Reaper API
//!
//! | operation        | request                                |
//! |------------------|----------------------------------------|
//! | `cluster_names`  | `GET /cluster`                         |
//! | `cluster`        | `GET /cluster/{name}`                  |
//! | `add_cluster`    | `PUT /cluster/{name}?seedHost={seed}`  |
//! | `delete_cluster` | `DELETE /cluster/{name}`               |
//!
//! The fan-out over all clusters lives in [`crate::fanout`].

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cancel::Cancellation;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::model::Cluster;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
use crate::wire::ClusterStatus;

/// Client for one Reaper endpoint.
///
/// Cheap to clone: clones share the transport and its connection pool.
pub struct ReaperClient<T = HttpTransport> {
    transport: Arc<T>,
    config: Arc<ClientConfig>,
}

impl<T> Clone for ReaperClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: Arc::clone(&self.config),
        }
    }
}

impl ReaperClient<HttpTransport> {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(transport, config))
    }

    /// Client with default settings for `base_url`
    pub fn from_url(base_url: &str) -> Result<Self> {
        Self::new(ClientConfig::new(base_url))
    }
}

impl<T: Transport> ReaperClient<T> {
    pub fn with_transport(transport: T, config: ClientConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Names of all registered clusters, in the order the service returns them
    pub async fn cluster_names(&self, cancel: &Cancellation) -> Result<Vec<String>> {
        let names: Vec<String> = self
            .call_json(ApiRequest::get(["cluster"]), cancel)
            .await
            .map_err(|e| e.context("failed to get cluster names"))?;

        debug!("service reports {} clusters", names.len());
        Ok(names)
    }

    /// Full status of one cluster, translated into the topology model
    pub async fn cluster(&self, name: &str, cancel: &Cancellation) -> Result<Cluster> {
        let status: ClusterStatus = self
            .call_json(ApiRequest::get(["cluster", name]), cancel)
            .await
            .map_err(|e| e.context(format!("failed to get cluster ({name})")))?;

        let mut cluster = Cluster::from(status);
        // An empty or `null` payload still answers for the requested cluster
        if cluster.name.is_empty() {
            cluster.name = name.to_string();
        }
        Ok(cluster)
    }

    /// Register a cluster through one of its seed hosts.
    ///
    /// The seed is sent as-is, an empty string included.
    pub async fn add_cluster(&self, name: &str, seed: &str, cancel: &Cancellation) -> Result<()> {
        let request = ApiRequest::put(["cluster", name]).with_query("seedHost", seed);
        self.call(request, cancel)
            .await
            .map_err(|e| e.context(format!("failed to add cluster ({name})")))?;

        info!("cluster {} added (seed host: {:?})", name, seed);
        Ok(())
    }

    pub async fn delete_cluster(&self, name: &str, cancel: &Cancellation) -> Result<()> {
        self.call(ApiRequest::delete(["cluster", name]), cancel)
            .await
            .map_err(|e| e.context(format!("failed to delete cluster ({name})")))?;

        info!("cluster {} deleted", name);
        Ok(())
    }

    async fn call(&self, request: ApiRequest, cancel: &Cancellation) -> Result<ApiResponse> {
        let response = self.transport.execute(request, cancel).await?;

        if self.config.check_status && !response.status.is_success() {
            return Err(ClientError::status(response.status.as_u16(), &response.body));
        }
        Ok(response)
    }

    /// An empty body or a literal `null` decodes to `D::default()`
    async fn call_json<D>(&self, request: ApiRequest, cancel: &Cancellation) -> Result<D>
    where
        D: DeserializeOwned + Default,
    {
        let response = self.call(request, cancel).await?;
        if response.is_empty() {
            return Ok(D::default());
        }
        let decoded: Option<D> = serde_json::from_slice(&response.body)?;
        Ok(decoded.unwrap_or_default())
    }
}
