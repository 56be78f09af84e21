use crate::registry::RankedNode;
use headroom_contracts::NodeSnapshot;
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Vue API d'un nœud classé
#[derive(Debug, Serialize)]
pub struct NodeView {
    pub rank: usize,
    pub node_id: String,
    pub score: f64,
    pub last_seen: String,       // format RFC3339 pour l'API
    pub stale: bool,             // marqué par le sweeper
    pub stale_for_seconds: i64,  // âge en secondes
    pub metrics: NodeSnapshot,
}

pub fn to_view(node: RankedNode, now: OffsetDateTime) -> NodeView {
    let age = (now - node.last_seen).whole_seconds().max(0);
    NodeView {
        rank: node.rank,
        last_seen: node.last_seen.format(&Rfc3339).unwrap_or_default(),
        stale: node.stale,
        stale_for_seconds: age,
        score: node.score,
        node_id: node.node_id,
        metrics: node.snapshot,
    }
}
