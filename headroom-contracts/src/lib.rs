//! Headroom wire contract
//!
//! Shared between `headroom-agent` (producer) and `headroom-kernel` (consumer):
//! - `NodeSnapshot`: one point-in-time bundle of a node's free capacity
//! - `Ack`: the collector's reply to a `SendStats` call
//! - route constants for the HTTP transport

pub mod snapshot;

pub use snapshot::{NodeSnapshot, StallMetric};

use serde::{Deserialize, Serialize};

/// `SendStats(nodeId, metrics) -> Ack`
pub const STATS_ROUTE: &str = "/stats";
/// Ranked view, best node first
pub const NODES_ROUTE: &str = "/nodes";

/// Collector reply to a stats push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub accepted: bool,
    pub tracked_nodes: usize,
}

/// Errors raised while decoding contract payloads
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("invalid snapshot payload: {0}")]
    Decode(#[source] serde_json::Error),
}
