//! Snapshot transmission to the kernel
//!
//! One `POST /stats` per interval, at-most-once: a failed cycle is logged
//! and dropped, the next cycle's snapshot supersedes it. No retry, no queue.

use crate::snapshot::SnapshotAssembler;
use headroom_contracts::{Ack, NodeSnapshot, STATS_ROUTE};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum TransmitError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("kernel answered {0}")]
    Status(reqwest::StatusCode),
    #[error("kernel did not accept the snapshot")]
    Rejected,
}

pub struct Transmitter {
    client: reqwest::Client,
    endpoint: String,
    interval: Duration,
}

impl Transmitter {
    /// `timeout` bounds each remote call so one stalled cycle cannot hold up the next.
    pub fn new(collector_url: &str, interval: Duration, timeout: Duration) -> Result<Self, TransmitError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", collector_url.trim_end_matches('/'), STATS_ROUTE),
            interval,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `SendStats(nodeId, metrics) -> Ack`
    pub async fn send(&self, snapshot: &NodeSnapshot) -> Result<Ack, TransmitError> {
        let response = self.client.post(&self.endpoint).json(snapshot).send().await?;
        if !response.status().is_success() {
            return Err(TransmitError::Status(response.status()));
        }
        let ack: Ack = response.json().await?;
        if !ack.accepted {
            return Err(TransmitError::Rejected);
        }
        Ok(ack)
    }

    /// Transmission loop; the first snapshot goes out one interval after start.
    pub async fn run(self, mut assembler: SnapshotAssembler, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(endpoint = %self.endpoint, interval_secs = self.interval.as_secs_f64(), "starting transmission loop");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let snapshot = assembler.assemble();
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = self.send(&snapshot) => outcome,
            };

            match outcome {
                Ok(ack) => debug!(
                    node_id = %snapshot.node_id,
                    tracked_nodes = ack.tracked_nodes,
                    "snapshot delivered"
                ),
                Err(e) => warn!(node_id = %snapshot.node_id, error = %e, "snapshot dropped"),
            }
        }
        info!("transmission loop stopped");
    }
}
