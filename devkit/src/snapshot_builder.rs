/*!
Builders pour snapshots de test

Construit des `NodeSnapshot` conformes au contrat sans passer par les
samplers de l'agent. Tous les champs non renseignés gardent leur valeur
"rien de connu" (`NodeSnapshot::empty`).
*/

use chrono::{DateTime, TimeZone, Utc};
use headroom_contracts::{NodeSnapshot, StallMetric};
use serde_json::Value;

/// Fixed timestamp so snapshots built twice compare equal
pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    snapshot: NodeSnapshot,
}

impl SnapshotBuilder {
    pub fn new<S: Into<String>>(node_id: S) -> Self {
        Self {
            snapshot: NodeSnapshot::empty(node_id, epoch()),
        }
    }

    pub fn cpu_idle(mut self, percent: f32) -> Self {
        self.snapshot.cpu_idle_percent = Some(percent);
        self
    }

    /// CPU sampler produced nothing
    pub fn no_cpu(mut self) -> Self {
        self.snapshot.cpu_idle_percent = None;
        self
    }

    pub fn ram(mut self, available_mb: u64, available_percent: u8) -> Self {
        self.snapshot.ram_available_mb = available_mb;
        self.snapshot.ram_available_percent = available_percent;
        self
    }

    pub fn swap(mut self, available_mb: u64, available_percent: u8) -> Self {
        self.snapshot.swap_available_mb = available_mb;
        self.snapshot.swap_available_percent = available_percent;
        self
    }

    pub fn disk_kb(mut self, available_kb: u64) -> Self {
        self.snapshot.disk_available_kb = available_kb;
        self
    }

    pub fn bandwidth_bps(mut self, bps: u64) -> Self {
        self.snapshot.network_bandwidth_bps = bps;
        self
    }

    pub fn stall_us(mut self, avg10: f32) -> Self {
        self.snapshot.memory_stall_avg_us = StallMetric::Supported(avg10);
        self
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.snapshot.observed_at = at;
        self
    }

    pub fn build(self) -> NodeSnapshot {
        self.snapshot
    }

    /// Payload JSON tel qu'envoyé sur `POST /stats`
    pub fn json(self) -> Value {
        serde_json::to_value(self.snapshot).unwrap_or(Value::Null)
    }
}
