/*!
Stub du service Reaper pour tests sans déploiement

Serveur axum en mémoire qui parle le protocole HTTP de Reaper:
- `GET /cluster`, `GET`/`PUT`/`DELETE /cluster/{name}`
- Injection de pannes (statut HTTP, JSON invalide, latence) par cluster ou sur le listing
- Journal des requêtes et compteur des `GET /cluster/{name}` en vol
*/

use axum::extract::{Path, Query, Request, State};
use axum::http::header::{HeaderName, ACCEPT, USER_AGENT};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use reaper_client::wire::ClusterStatus;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use anyhow::Result;

/// Requête reçue par le stub (pour assertions de tests)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    /// Path as sent, still percent-encoded
    pub path: String,
    pub query: Option<String>,
    pub accept: Option<String>,
    pub user_agent: Option<String>,
}

/// Panne injectée sur une route
#[derive(Debug, Clone)]
pub enum Fault {
    /// Answer with this HTTP status and a JSON error body
    Status(u16),
    /// Answer 200 with a truncated JSON body
    MalformedBody,
    /// Wait before answering normally
    Delay(Duration),
}

#[derive(Default)]
struct StubState {
    /// Listing order, i.e. registration order
    order: Vec<String>,
    clusters: HashMap<String, ClusterStatus>,
    faults: HashMap<String, Fault>,
    listing_fault: Option<Fault>,
    fetch_delay: Duration,
    requests: Vec<RecordedRequest>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<StubState>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

type SharedStub = Arc<Shared>;

/// Decrements the in-flight counter even when the client hangs up
struct InFlight<'a>(&'a Shared);

impl<'a> InFlight<'a> {
    fn enter(shared: &'a Shared) -> Self {
        let now = shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        shared.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serveur Reaper simulé, arrêté au drop
pub struct StubReaper {
    addr: SocketAddr,
    shared: SharedStub,
    shutdown: Option<oneshot::Sender<()>>,
}

impl StubReaper {
    /// Démarre le stub sur un port libre de 127.0.0.1
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = SharedStub::default();
        let (shutdown, stopped) = oneshot::channel::<()>();

        let app = router(shared.clone());
        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = stopped.await;
            });
            if let Err(e) = server.await {
                tracing::warn!("stub reaper stopped with error: {}", e);
            }
        });

        tracing::info!("🧪 [STUB] Reaper listening on http://{}", addr);
        Ok(Self {
            addr,
            shared,
            shutdown: Some(shutdown),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Enregistre (ou remplace) un cluster
    pub fn insert_cluster(&self, status: ClusterStatus) {
        let mut state = self.shared.state.lock();
        if !state.clusters.contains_key(&status.name) {
            state.order.push(status.name.clone());
        }
        state.clusters.insert(status.name.clone(), status);
    }

    pub fn cluster(&self, name: &str) -> Option<ClusterStatus> {
        self.shared.state.lock().clusters.get(name).cloned()
    }

    pub fn cluster_names(&self) -> Vec<String> {
        self.shared.state.lock().order.clone()
    }

    /// Injecte une panne sur `GET /cluster/{name}`
    pub fn fail_cluster(&self, name: &str, fault: Fault) {
        self.shared.state.lock().faults.insert(name.to_string(), fault);
    }

    pub fn clear_fault(&self, name: &str) {
        self.shared.state.lock().faults.remove(name);
    }

    /// Injecte une panne sur `GET /cluster`
    pub fn fail_listing(&self, fault: Fault) {
        self.shared.state.lock().listing_fault = Some(fault);
    }

    /// Latence appliquée à chaque `GET /cluster/{name}`
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.shared.state.lock().fetch_delay = delay;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.shared.state.lock().requests.clone()
    }

    /// Requêtes reçues pour une méthode et un chemin donnés
    pub fn requests_for(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.shared
            .state
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .cloned()
            .collect()
    }

    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Plus grand nombre de `GET /cluster/{name}` simultanés observé
    pub fn peak_in_flight(&self) -> usize {
        self.shared.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Reset journal et compteurs (les clusters restent enregistrés)
    pub fn reset_stats(&self) {
        self.shared.state.lock().requests.clear();
        self.shared.peak_in_flight.store(0, Ordering::SeqCst);
    }
}

impl Drop for StubReaper {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn router(shared: SharedStub) -> Router {
    Router::new()
        .route("/cluster", get(list_clusters))
        .route(
            "/cluster/{name}",
            get(get_cluster).put(add_cluster).delete(delete_cluster),
        )
        .fallback(no_route)
        .with_state(shared.clone())
        .layer(middleware::from_fn_with_state(shared, record_request))
}

fn header(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

async fn record_request(State(shared): State<SharedStub>, req: Request, next: Next) -> Response {
    let recorded = RecordedRequest {
        method: req.method().to_string(),
        path: req.uri().path().to_string(),
        query: req.uri().query().map(str::to_string),
        accept: header(req.headers(), ACCEPT),
        user_agent: header(req.headers(), USER_AGENT),
    };
    shared.state.lock().requests.push(recorded);
    next.run(req).await
}

/// `Some(response)` quand la panne remplace la réponse normale
async fn apply_fault(fault: Option<Fault>) -> Option<Response> {
    match fault? {
        Fault::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = serde_json::json!({ "message": format!("injected failure ({code})") });
            Some((status, Json(body)).into_response())
        }
        Fault::MalformedBody => Some((StatusCode::OK, r#"{"name": "#).into_response()),
        Fault::Delay(delay) => {
            tokio::time::sleep(delay).await;
            None
        }
    }
}

fn not_found(name: &str) -> Response {
    let body = serde_json::json!({ "message": format!("cluster {name} not found") });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

async fn no_route(req: Request) -> Response {
    let body = serde_json::json!({ "message": format!("no route for {}", req.uri().path()) });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

// GET /cluster
async fn list_clusters(State(shared): State<SharedStub>) -> Response {
    let fault = shared.state.lock().listing_fault.clone();
    if let Some(response) = apply_fault(fault).await {
        return response;
    }
    let names = shared.state.lock().order.clone();
    Json(names).into_response()
}

// GET /cluster/{name}
async fn get_cluster(State(shared): State<SharedStub>, Path(name): Path<String>) -> Response {
    let _in_flight = InFlight::enter(&shared);

    let (fault, delay) = {
        let state = shared.state.lock();
        (state.faults.get(&name).cloned(), state.fetch_delay)
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    if let Some(response) = apply_fault(fault).await {
        return response;
    }

    let status = shared.state.lock().clusters.get(&name).cloned();
    match status {
        Some(status) => Json(status).into_response(),
        None => not_found(&name),
    }
}

// PUT /cluster/{name}?seedHost=...
async fn add_cluster(
    State(shared): State<SharedStub>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> StatusCode {
    let seed = params.get("seedHost").cloned().unwrap_or_default();
    let mut state = shared.state.lock();
    if !state.clusters.contains_key(&name) {
        state.order.push(name.clone());
    }
    let status = ClusterStatus {
        name: name.clone(),
        seed_hosts: vec![seed],
        ..ClusterStatus::default()
    };
    state.clusters.insert(name, status);
    StatusCode::CREATED
}

// DELETE /cluster/{name}
async fn delete_cluster(State(shared): State<SharedStub>, Path(name): Path<String>) -> Response {
    let mut state = shared.state.lock();
    if state.clusters.remove(&name).is_none() {
        return not_found(&name);
    }
    state.order.retain(|n| n != &name);
    StatusCode::ACCEPTED.into_response()
}
