/**
 * HEADROOM KERNEL - Collecteur central et classement des nœuds
 *
 * RÔLE : reçoit les snapshots des agents (POST /stats), maintient un seul
 * snapshot vivant par nœud et expose le classement "plus de capacité libre
 * d'abord" aux outils de placement.
 *
 * ARCHITECTURE : Registry partagé + API HTTP axum + tâches de fond
 * optionnelles (balayage des nœuds silencieux, diffusion MQTT du classement).
 */

mod broadcast;
mod config;
mod health;
mod http;
mod models;
mod ranking;
mod registry;

use crate::config::load_config;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::ranking::RankingPolicy;
use crate::registry::Registry;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await.context("Failed to load kernel config")?;
    let policy = RankingPolicy::new(cfg.ranking)?;
    info!(weights = ?policy.weights(), "ranking policy ready");

    let registry = Arc::new(Registry::new(policy));
    let health_tracker = HealthTracker::new();

    let shutdown = CancellationToken::new();
    let mut tasks = JoinSet::new();

    // balayage des nœuds silencieux
    if let Some(staleness) = cfg.staleness {
        registry::spawn_staleness_sweeper(registry.clone(), staleness, &mut tasks, shutdown.clone());
    }

    // diffusion MQTT du classement
    if let Some(mqtt) = cfg.mqtt.clone() {
        broadcast::spawn_ranking_publisher(mqtt, registry.clone(), health_tracker.clone(), &mut tasks, shutdown.clone());
    }

    let app = http::build_router(AppState {
        registry,
        health_tracker,
    });

    let listener = TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.listen))?;
    info!("[kernel] listening on http://{}", cfg.listen);

    let server_shutdown = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await;

    shutdown.cancel();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "kernel task failed");
        }
    }
    served.context("HTTP server failed")?;
    info!("kernel stopped");
    Ok(())
}
