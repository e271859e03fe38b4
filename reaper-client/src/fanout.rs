//! Concurrent fetch of every registered cluster
//!
//! Features:
//! - Bounded worker pool: at most W fetches in flight, W = `ClientConfig::fan_out_width()`
//! - Results streamed in completion order through a channel of capacity W
//! - Backpressure: a slow consumer blocks the workers, results are never dropped
//! - One failing cluster never aborts its siblings
//! - Fail-fast collection on top of the stream
//!
//! The stream closes only once every worker has delivered its last result.

use futures::{FutureExt, Stream};
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cancel::Cancellation;
use crate::client::ReaperClient;
use crate::error::{ClientError, Result};
use crate::model::{Cluster, FetchResult};
use crate::transport::Transport;

type NameQueue = Arc<Mutex<std::vec::IntoIter<String>>>;

/// Live results of a fan-out, in completion order.
///
/// Also usable as a `futures::Stream`. Dropping it early is fine: workers
/// finish their current fetch and stop.
#[derive(Debug)]
pub struct ClusterStream {
    results: mpsc::Receiver<FetchResult>,
    expected: usize,
}

impl ClusterStream {
    fn new(results: mpsc::Receiver<FetchResult>, expected: usize) -> Self {
        Self { results, expected }
    }

    /// Number of cluster fetches launched, 0 when the listing failed
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Next result, `None` once every fetch has been delivered
    pub async fn next_result(&mut self) -> Option<FetchResult> {
        self.results.recv().await
    }

    pub async fn collect_all(mut self) -> Vec<FetchResult> {
        let mut all = Vec::with_capacity(self.expected.max(1));
        while let Some(result) = self.next_result().await {
            all.push(result);
        }
        all
    }
}

impl Stream for ClusterStream {
    type Item = FetchResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<FetchResult>> {
        self.results.poll_recv(cx)
    }
}

impl<T: Transport> ReaperClient<T> {
    /// Fetch every registered cluster with bounded parallelism.
    ///
    /// The cluster list is fetched before returning. If that fails, the
    /// stream holds a single [`FetchResult::ListingFailed`] and is closed.
    /// Otherwise it yields exactly one result per cluster name.
    pub async fn stream_clusters(&self, cancel: &Cancellation) -> ClusterStream {
        let fan_out_id = Uuid::new_v4();
        let width = self.config().fan_out_width();
        let (tx, rx) = mpsc::channel(width);

        let names = match self.cluster_names(cancel).await {
            Ok(names) => names,
            Err(error) => {
                warn!(%fan_out_id, "cluster listing failed, nothing fetched: {}", error);
                // Capacity is at least 1 and the channel is fresh
                let _ = tx.try_send(FetchResult::ListingFailed(error));
                return ClusterStream::new(rx, 0);
            }
        };

        let total = names.len();
        info!(%fan_out_id, clusters = total, width, "fetching all clusters");

        let span = info_span!("fan_out", id = %fan_out_id);
        tokio::spawn(
            self.clone()
                .run_fan_out(names, width, tx, cancel.clone())
                .instrument(span),
        );

        ClusterStream::new(rx, total)
    }

    /// Fetch every cluster, failing fast.
    ///
    /// Returns the first failure observed and discards everything else;
    /// partial results are never returned. On success, clusters come in
    /// completion order: sort them if a stable order matters.
    pub async fn fetch_clusters(&self, cancel: &Cancellation) -> Result<Vec<Cluster>> {
        let mut stream = self.stream_clusters(cancel).await;
        let mut clusters = Vec::with_capacity(stream.expected());

        while let Some(result) = stream.next_result().await {
            clusters.push(result.into_result()?);
        }
        Ok(clusters)
    }

    /// Orchestrator: owns the workers and, through them, the producer side
    async fn run_fan_out(
        self,
        names: Vec<String>,
        width: usize,
        results: mpsc::Sender<FetchResult>,
        cancel: Cancellation,
    ) {
        let workers_needed = width.min(names.len());
        let queue: NameQueue = Arc::new(Mutex::new(names.into_iter()));

        let mut workers = JoinSet::new();
        for worker in 0..workers_needed {
            workers.spawn(fetch_worker(
                self.clone(),
                worker,
                Arc::clone(&queue),
                results.clone(),
                cancel.clone(),
            ));
        }
        // The stream closes when the last worker drops its sender
        drop(results);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("fan-out worker terminated abnormally: {}", e);
            }
        }
        debug!("fan-out complete");
    }

    async fn fetch_one(&self, name: String, cancel: &Cancellation) -> FetchResult {
        let outcome = AssertUnwindSafe(self.cluster(&name, cancel))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(cluster)) => {
                debug!(cluster = %name, "cluster fetched");
                FetchResult::Fetched(cluster)
            }
            Ok(Err(error)) => {
                warn!(cluster = %name, "cluster fetch failed: {}", error);
                FetchResult::Failed {
                    cluster: name,
                    error,
                }
            }
            Err(_) => {
                error!(cluster = %name, "cluster fetch panicked");
                FetchResult::Failed {
                    error: ClientError::TaskPanicked {
                        cluster: name.clone(),
                    },
                    cluster: name,
                }
            }
        }
    }
}

/// Pull names until the queue is empty or the consumer is gone
async fn fetch_worker<T: Transport>(
    client: ReaperClient<T>,
    worker: usize,
    queue: NameQueue,
    results: mpsc::Sender<FetchResult>,
    cancel: Cancellation,
) {
    loop {
        let next = { queue.lock().next() };
        let Some(name) = next else { break };

        let result = client.fetch_one(name, &cancel).await;
        if results.send(result).await.is_err() {
            debug!(worker, "result stream dropped, worker stopping");
            return;
        }
    }
    debug!(worker, "no clusters left, worker done");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::transport::{ApiRequest, ApiResponse};
    use async_trait::async_trait;
    use futures::StreamExt;
    use reqwest::StatusCode;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Ok,
        Refused,
        Panic,
    }

    /// In-memory Reaper with an in-flight counter on cluster fetches
    struct ScriptedTransport {
        names: Vec<String>,
        behaviours: Mutex<std::collections::HashMap<String, Behaviour>>,
        listing_fails: bool,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        fetches: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(count: usize) -> Self {
            Self::with_names((0..count).map(|i| format!("cluster-{i}")).collect())
        }

        fn with_names(names: Vec<String>) -> Self {
            Self {
                names,
                behaviours: Mutex::new(Default::default()),
                listing_fails: false,
                delay: Duration::from_millis(5),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                fetches: AtomicUsize::new(0),
            }
        }

        fn behave(self, name: &str, behaviour: Behaviour) -> Self {
            self.behaviours.lock().insert(name.to_string(), behaviour);
            self
        }

        fn delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, request: ApiRequest, cancel: &Cancellation) -> Result<ApiResponse> {
            if let Some(reason) = cancel.reason() {
                return Err(ClientError::Cancelled(reason));
            }

            if request.segments.len() == 1 {
                if self.listing_fails {
                    return Err(ClientError::transport(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "connection refused",
                    )));
                }
                let body = serde_json::to_vec(&self.names).unwrap();
                return Ok(ApiResponse::new(StatusCode::OK, body));
            }

            let name = request.segments[1].clone();
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            tokio::select! {
                reason = cancel.done() => return Err(ClientError::Cancelled(reason)),
                _ = tokio::time::sleep(self.delay) => {}
            }

            let behaviour = self.behaviours.lock().get(&name).copied().unwrap_or(Behaviour::Ok);
            match behaviour {
                Behaviour::Ok => {
                    let body = serde_json::json!({"name": name, "seed_hosts": ["10.0.0.1"]});
                    Ok(ApiResponse::new(StatusCode::OK, body.to_string()))
                }
                Behaviour::Refused => Err(ClientError::transport(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ))),
                Behaviour::Panic => panic!("scripted panic for {name}"),
            }
        }
    }

    fn client(transport: ScriptedTransport, width: usize) -> ReaperClient<ScriptedTransport> {
        ReaperClient::with_transport(transport, ClientConfig::default().with_max_concurrency(width))
    }

    #[tokio::test]
    async fn test_one_result_per_cluster() {
        let client = client(ScriptedTransport::new(20), 3);
        let stream = client.stream_clusters(&Cancellation::new()).await;
        assert_eq!(stream.expected(), 20);

        let results = stream.collect_all().await;
        assert_eq!(results.len(), 20);
        assert!(results.iter().all(FetchResult::is_ok));

        let names: HashSet<_> = results.iter().filter_map(|r| r.cluster_name()).collect();
        assert_eq!(names.len(), 20);
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_width() {
        let transport = ScriptedTransport::new(40).delay(Duration::from_millis(15));
        let client = client(transport, 4);

        let clusters = client.fetch_clusters(&Cancellation::new()).await.unwrap();

        assert_eq!(clusters.len(), 40);
        let peak = client.transport().peak.load(Ordering::SeqCst);
        assert!(peak <= 4, "peak in-flight was {peak}");
        assert!(peak >= 2, "fetches did not overlap (peak {peak})");
    }

    #[tokio::test]
    async fn test_default_width_bound() {
        let transport = ScriptedTransport::new(30).delay(Duration::from_millis(10));
        let client = ReaperClient::with_transport(transport, ClientConfig::default());
        let width = client.config().fan_out_width();

        let clusters = client.fetch_clusters(&Cancellation::new()).await.unwrap();
        assert_eq!(clusters.len(), 30);
        assert!(client.transport().peak.load(Ordering::SeqCst) <= width.min(5));
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_siblings() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let transport = ScriptedTransport::with_names(names).behave("b", Behaviour::Refused);
        let client = client(transport, 2);

        let results = client.stream_clusters(&Cancellation::new()).await.collect_all().await;
        assert_eq!(results.len(), 3);

        let ok: HashSet<_> = results
            .iter()
            .filter(|r| r.is_ok())
            .filter_map(|r| r.cluster_name())
            .collect();
        assert_eq!(ok, HashSet::from(["a", "c"]));

        let failed: Vec<_> = results.iter().filter(|r| !r.is_ok()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].cluster_name(), Some("b"));
        assert!(matches!(failed[0].error().unwrap().root_cause(), ClientError::Transport(_)));
    }

    #[tokio::test]
    async fn test_fetch_clusters_fails_fast() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let transport = ScriptedTransport::with_names(names).behave("b", Behaviour::Refused);
        let client = client(transport, 2);

        let err = client.fetch_clusters(&Cancellation::new()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to get cluster (b): transport error: connection refused"
        );
    }

    #[tokio::test]
    async fn test_listing_failure_is_a_single_element() {
        let mut transport = ScriptedTransport::new(5);
        transport.listing_fails = true;
        let client = client(transport, 2);

        let mut stream = client.stream_clusters(&Cancellation::new()).await;
        assert_eq!(stream.expected(), 0);

        match stream.next_result().await {
            Some(FetchResult::ListingFailed(error)) => {
                assert!(error.to_string().starts_with("failed to get cluster names"));
            }
            other => panic!("unexpected first element: {other:?}"),
        }
        assert!(stream.next_result().await.is_none());
        assert_eq!(client.transport().fetches.load(Ordering::SeqCst), 0);

        let err = client.fetch_clusters(&Cancellation::new()).await.unwrap_err();
        assert!(err.to_string().starts_with("failed to get cluster names"));
    }

    #[tokio::test]
    async fn test_empty_cluster_list_closes_immediately() {
        let client = client(ScriptedTransport::new(0), 3);
        let results = client.stream_clusters(&Cancellation::new()).await.collect_all().await;
        assert!(results.is_empty());
        assert!(client.fetch_clusters(&Cancellation::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_flight_resolves_every_cluster() {
        let transport = ScriptedTransport::new(12).delay(Duration::from_secs(30));
        let client = client(transport, 3);
        let cancel = Cancellation::new();

        let stream = client.stream_clusters(&cancel).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let results = tokio::time::timeout(Duration::from_secs(5), stream.collect_all())
            .await
            .expect("stream did not close after cancellation");

        assert_eq!(results.len(), 12);
        assert!(results.iter().all(|r| r.error().is_some_and(ClientError::is_cancelled)));
        // Only the first wave reached the network
        assert!(client.transport().fetches.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_deadline_reports_its_own_reason() {
        let transport = ScriptedTransport::new(4).delay(Duration::from_secs(30));
        let client = client(transport, 2);
        let cancel = Cancellation::with_timeout(Duration::from_millis(50));

        let err = client.fetch_clusters(&cancel).await.unwrap_err();
        assert_eq!(err.cancel_reason(), Some(crate::cancel::CancelReason::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_panicking_fetch_is_reported() {
        let transport = ScriptedTransport::new(6).behave("cluster-2", Behaviour::Panic);
        let client = client(transport, 2);

        let results = client.stream_clusters(&Cancellation::new()).await.collect_all().await;
        assert_eq!(results.len(), 6);

        let panicked: Vec<_> = results
            .iter()
            .filter(|r| matches!(r.error(), Some(ClientError::TaskPanicked { .. })))
            .collect();
        assert_eq!(panicked.len(), 1);
        assert_eq!(panicked[0].cluster_name(), Some("cluster-2"));
    }

    #[tokio::test]
    async fn test_slow_consumer_applies_backpressure() {
        let transport = ScriptedTransport::new(20).delay(Duration::from_millis(1));
        let client = client(transport, 2);

        let mut stream = client.stream_clusters(&Cancellation::new()).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        // 2 results buffered in the channel + 2 held by blocked workers
        let fetched = client.transport().fetches.load(Ordering::SeqCst);
        assert!(fetched <= 4, "{fetched} fetches ran without a consumer");

        let mut delivered = 0;
        while let Some(result) = stream.next().await {
            assert!(result.is_ok());
            delivered += 1;
        }
        assert_eq!(delivered, 20);
    }

    #[tokio::test]
    async fn test_dropped_stream_stops_workers() {
        let transport = ScriptedTransport::new(50).delay(Duration::from_millis(5));
        let client = client(transport, 2);

        let mut stream = client.stream_clusters(&Cancellation::new()).await;
        assert!(stream.next_result().await.is_some());
        drop(stream);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let fetched = client.transport().fetches.load(Ordering::SeqCst);
        assert!(fetched < 50, "workers kept fetching after the consumer left");
        assert_eq!(client.transport().in_flight.load(Ordering::SeqCst), 0);
    }
}
