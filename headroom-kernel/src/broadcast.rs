//! Optional MQTT broadcast of the ranked view
//!
//! Publishes the full ranking to `mqtt.topic` every `publish_interval_secs`.
//! Broker errors are logged and the loop keeps polling; the HTTP surface
//! never depends on the broker being up.

use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::models::{to_view, NodeView};
use crate::registry::Registry;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
pub struct RankingMessage {
    pub generated_at: String,
    pub nodes: Vec<NodeView>,
}

pub fn ranking_message(registry: &Registry, now: OffsetDateTime) -> RankingMessage {
    RankingMessage {
        generated_at: now.format(&Rfc3339).unwrap_or_default(),
        nodes: registry.ranked_view().into_iter().map(|n| to_view(n, now)).collect(),
    }
}

/// Démarre la publication périodique du classement
pub fn spawn_ranking_publisher(
    conf: MqttConf,
    registry: Arc<Registry>,
    health: HealthTracker,
    tasks: &mut JoinSet<()>,
    shutdown: CancellationToken,
) {
    let mut opts = MqttOptions::new("headroom-kernel-ranking", &conf.host, conf.port);
    opts.set_keep_alive(Duration::from_secs(15));
    let (client, mut eventloop) = AsyncClient::new(opts, 10);
    health.mark_mqtt_connecting();

    tasks.spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(conf.publish_interval_secs));
        info!(host = %conf.host, port = conf.port, topic = %conf.topic, "ranking publisher started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let message = ranking_message(&registry, OffsetDateTime::now_utc());
                    let payload = match serde_json::to_vec(&message) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(error = %e, "failed to encode ranking");
                            continue;
                        }
                    };
                    // this task also polls the event loop: never await a full queue
                    match client.try_publish(&conf.topic, QoS::AtLeastOnce, false, payload) {
                        Ok(()) => debug!(nodes = message.nodes.len(), "ranking published"),
                        Err(e) => warn!(error = %e, "failed to publish ranking"),
                    }
                },
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("MQTT connected");
                        health.mark_mqtt_connected();
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "MQTT error");
                        health.increment_reconnects();
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(Duration::from_secs(2)) => {}
                        }
                    }
                },
            }
        }
        let _ = client.try_disconnect();
        info!("ranking publisher stopped");
    });
}
