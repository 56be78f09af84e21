/*!
Collecteur HTTP factice pour tester l'agent sans kernel

Démarre un vrai serveur axum sur `127.0.0.1:0` qui accepte `POST /stats`,
enregistre chaque snapshot reçu et répond un `Ack`. Peut simuler une panne
(503) pour tester la politique at-most-once de l'agent.
*/

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use headroom_contracts::{Ack, NodeSnapshot, STATS_ROUTE};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Clone, Default)]
struct StubState {
    received: Arc<Mutex<Vec<NodeSnapshot>>>,
    failing: Arc<AtomicBool>,
}

/// Stub kernel recording every snapshot it is sent
pub struct StubCollector {
    addr: SocketAddr,
    state: StubState,
    server: JoinHandle<()>,
}

impl StubCollector {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = StubState::default();

        let app = Router::new()
            .route(STATS_ROUTE, post(receive_stats))
            .with_state(state.clone());

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::warn!("[stub] collector stopped: {}", e);
            }
        });

        log::info!("📡 [STUB] collector listening on {}", addr);
        Ok(Self { addr, state, server })
    }

    /// Base URL à donner à l'agent (`collector_url`)
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Répond 503 à tous les envois tant que `failing` est vrai
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<NodeSnapshot> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn received_from(&self, node_id: &str) -> Vec<NodeSnapshot> {
        self.received().into_iter().filter(|s| s.node_id == node_id).collect()
    }

    pub fn clear(&self) {
        self.state.received.lock().unwrap().clear();
    }

    /// Attend qu'au moins `count` snapshots soient arrivés
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Result<Vec<NodeSnapshot>> {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            let received = self.received();
            if received.len() >= count {
                return Ok(received);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        anyhow::bail!(
            "timeout waiting for {} snapshots, got {}",
            count,
            self.state.received.lock().unwrap().len()
        );
    }
}

impl Drop for StubCollector {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn receive_stats(State(state): State<StubState>, body: Bytes) -> Response {
    if state.failing.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "stub collector failing").into_response();
    }

    match NodeSnapshot::from_json(&body) {
        Ok(snapshot) => {
            log::info!("📥 [STUB] stats from {}", snapshot.node_id);
            let mut received = state.received.lock().unwrap();
            received.push(snapshot);
            let tracked_nodes = received.iter().map(|s| s.node_id.as_str()).collect::<HashSet<_>>().len();
            Json(Ack { accepted: true, tracked_nodes }).into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}
