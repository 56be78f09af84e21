/**
 * API HTTP HEADROOM - ingestion des snapshots et vue classée
 *
 * RÔLE :
 * Point d'entrée réseau du kernel. Les agents poussent leurs snapshots,
 * les outils de placement lisent le classement.
 *
 * ROUTES :
 * - POST /stats         : ingestion d'un NodeSnapshot, répond un Ack
 * - GET  /nodes[?limit] : vue classée, meilleur nœud en premier
 * - GET  /nodes/{id}    : un nœud (404 si inconnu)
 * - GET  /health        : "ok"
 * - GET  /system/health : uptime, nœuds suivis, ingestions
 *
 * Les handlers sont des fonctions libres sur `AppState`; le Registry gère
 * seul sa synchronisation.
 */

use crate::health::{HealthTracker, KernelHealth};
use crate::models::{to_view, NodeView};
use crate::registry::Registry;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use headroom_contracts::{Ack, NodeSnapshot, NODES_ROUTE, STATS_ROUTE};
use serde::Deserialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::debug;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub health_tracker: HealthTracker,
}

#[derive(Debug, Deserialize)]
struct NodesParams {
    limit: Option<usize>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route(STATS_ROUTE, post(post_stats))
        .route(NODES_ROUTE, get(get_nodes))
        .route(&format!("{NODES_ROUTE}/{{id}}"), get(get_node))
        .with_state(app_state)
}

// POST /stats
async fn post_stats(State(app): State<AppState>, Json(snapshot): Json<NodeSnapshot>) -> Json<Ack> {
    let node_id = snapshot.node_id.clone();
    let outcome = app.registry.ingest(snapshot);
    app.health_tracker.record_ingest();
    debug!(node_id = %node_id, outcome = ?outcome, "snapshot ingested");
    Json(Ack {
        accepted: true,
        tracked_nodes: outcome.tracked_nodes(),
    })
}

// GET /nodes (classement)
async fn get_nodes(State(app): State<AppState>, Query(params): Query<NodesParams>) -> Json<Vec<NodeView>> {
    let now = OffsetDateTime::now_utc();
    let limit = params.limit.unwrap_or(usize::MAX);
    let views = app
        .registry
        .ranked_view()
        .into_iter()
        .take(limit)
        .map(|n| to_view(n, now))
        .collect();
    Json(views)
}

// GET /nodes/{id}
async fn get_node(State(app): State<AppState>, Path(id): Path<String>) -> Result<Json<NodeView>, StatusCode> {
    app.registry
        .get(&id)
        .map(|n| Json(to_view(n, OffsetDateTime::now_utc())))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.registry))
}
