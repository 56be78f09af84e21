//! RankingPolicy: "more free capacity is better"
//!
//! Each snapshot is reduced to a scalar score in `[0, 1]` independently of
//! every other snapshot, then nodes are ordered by score descending with
//! `node_id` as tie-breaker. Because the score is a pure function of one
//! snapshot, the resulting order is a strict total order no matter in which
//! sequence nodes were ingested.

use crate::config::{ConfigError, RankingWeights};
use headroom_contracts::NodeSnapshot;
use serde::Serialize;
use std::cmp::Ordering;

/// Per-dimension desirability, each in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Desirability {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub network: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingPolicy {
    weights: RankingWeights,
    total_weight: f64,
}

impl RankingPolicy {
    pub fn new(weights: RankingWeights) -> Result<Self, ConfigError> {
        let dims = [
            ("cpu", weights.cpu),
            ("memory", weights.memory),
            ("disk", weights.disk),
            ("network", weights.network),
        ];
        for (name, w) in dims {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::Weights(format!("{name} weight must be finite and >= 0, got {w}")));
            }
        }
        let total_weight: f64 = dims.iter().map(|(_, w)| w).sum();
        if total_weight <= 0.0 {
            return Err(ConfigError::Weights("at least one weight must be positive".into()));
        }
        for (name, r) in [
            ("disk_reference_kb", weights.disk_reference_kb),
            ("network_reference_bps", weights.network_reference_bps),
        ] {
            if !r.is_finite() || r <= 0.0 {
                return Err(ConfigError::Weights(format!("{name} must be finite and > 0, got {r}")));
            }
        }
        Ok(Self { weights, total_weight })
    }

    pub fn weights(&self) -> &RankingWeights {
        &self.weights
    }

    pub fn desirability(&self, s: &NodeSnapshot) -> Desirability {
        // absent CPU reading counts as fully busy
        let cpu = s.cpu_idle_percent.map_or(0.0, |idle| unit(f64::from(idle) / 100.0));
        let memory = unit((f64::from(s.ram_available_percent) + f64::from(s.swap_available_percent)) / 200.0);
        let disk_kb = s.disk_available_kb as f64;
        let disk = unit(disk_kb / (disk_kb + self.weights.disk_reference_kb));
        let net_ref = self.weights.network_reference_bps;
        let network = unit(net_ref / (net_ref + s.network_bandwidth_bps as f64));
        Desirability { cpu, memory, disk, network }
    }

    /// Weighted mean of the desirabilities, in `[0, 1]`
    pub fn score(&self, s: &NodeSnapshot) -> f64 {
        let d = self.desirability(s);
        let w = &self.weights;
        let sum = w.cpu * d.cpu + w.memory * d.memory + w.disk * d.disk + w.network * d.network;
        // `+ 0.0` folds -0.0 into 0.0 for total_cmp
        unit(sum / self.total_weight) + 0.0
    }

    pub fn rank_key(&self, s: &NodeSnapshot) -> RankKey {
        RankKey {
            score: self.score(s),
            node_id: s.node_id.clone(),
        }
    }

    /// `Less` when `a` is more desirable than `b`
    pub fn compare(&self, a: &NodeSnapshot, b: &NodeSnapshot) -> Ordering {
        self.rank_key(a).cmp(&self.rank_key(b))
    }
}

fn unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Sort key of a registry entry: best score first, then `node_id` ascending
#[derive(Debug, Clone)]
pub struct RankKey {
    pub score: f64,
    pub node_id: String,
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.node_id.cmp(&other.node_id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RankKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankKey {}
