//! Registry: latest snapshot per node plus its ranked index
//!
//! One `parking_lot::Mutex` guards the `node_id -> Entry` map and the
//! `BTreeSet<RankKey>` index together. Scores are computed before locking;
//! the critical section is only "remove old key, store entry, insert new key"
//! so a reader can never see a node twice or out of order.

use crate::config::{StaleAction, StalenessPolicy};
use crate::ranking::{RankKey, RankingPolicy};
use headroom_contracts::NodeSnapshot;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct Entry {
    snapshot: NodeSnapshot,
    key: RankKey,
    last_seen: OffsetDateTime,
    stale: bool,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    index: BTreeSet<RankKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted { tracked_nodes: usize },
    Replaced { tracked_nodes: usize },
}

impl IngestOutcome {
    pub fn tracked_nodes(&self) -> usize {
        match self {
            Self::Inserted { tracked_nodes } | Self::Replaced { tracked_nodes } => *tracked_nodes,
        }
    }
}

/// One row of the ranked view; `rank` starts at 1
#[derive(Debug, Clone)]
pub struct RankedNode {
    pub rank: usize,
    pub node_id: String,
    pub score: f64,
    pub snapshot: NodeSnapshot,
    pub last_seen: OffsetDateTime,
    pub stale: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: Vec<String>,
    pub flagged: usize,
}

pub struct Registry {
    policy: RankingPolicy,
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new(policy: RankingPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn ingest(&self, snapshot: NodeSnapshot) -> IngestOutcome {
        self.ingest_at(snapshot, OffsetDateTime::now_utc())
    }

    /// Upsert by `node_id`: the previous entry, if any, is replaced wholesale.
    pub fn ingest_at(&self, snapshot: NodeSnapshot, now: OffsetDateTime) -> IngestOutcome {
        let key = self.policy.rank_key(&snapshot);
        let entry = Entry {
            snapshot,
            key: key.clone(),
            last_seen: now,
            stale: false,
        };

        let mut inner = self.inner.lock();
        let previous = inner.entries.insert(key.node_id.clone(), entry);
        if let Some(old) = &previous {
            inner.index.remove(&old.key);
        }
        inner.index.insert(key);
        let tracked_nodes = inner.entries.len();
        drop(inner);

        match previous {
            Some(_) => IngestOutcome::Replaced { tracked_nodes },
            None => IngestOutcome::Inserted { tracked_nodes },
        }
    }

    /// Best node first, copied out under a single lock
    pub fn ranked_view(&self) -> Vec<RankedNode> {
        let inner = self.inner.lock();
        inner
            .index
            .iter()
            .enumerate()
            .filter_map(|(i, key)| {
                inner.entries.get(&key.node_id).map(|e| RankedNode {
                    rank: i + 1,
                    node_id: key.node_id.clone(),
                    score: key.score,
                    snapshot: e.snapshot.clone(),
                    last_seen: e.last_seen,
                    stale: e.stale,
                })
            })
            .collect()
    }

    pub fn get(&self, node_id: &str) -> Option<RankedNode> {
        let inner = self.inner.lock();
        let entry = inner.entries.get(node_id)?;
        let rank = inner.index.range(..&entry.key).count() + 1;
        Some(RankedNode {
            rank,
            node_id: node_id.to_string(),
            score: entry.key.score,
            snapshot: entry.snapshot.clone(),
            last_seen: entry.last_seen,
            stale: entry.stale,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict or flag every entry not refreshed within `policy.ttl()`
    pub fn sweep(&self, now: OffsetDateTime, policy: &StalenessPolicy) -> SweepReport {
        let ttl = policy.ttl();
        let mut report = SweepReport::default();
        let mut inner = self.inner.lock();

        match policy.action {
            StaleAction::Evict => {
                let expired: Vec<String> = inner
                    .entries
                    .iter()
                    .filter(|(_, e)| now - e.last_seen > ttl)
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in &expired {
                    if let Some(old) = inner.entries.remove(id) {
                        inner.index.remove(&old.key);
                    }
                }
                report.evicted = expired;
            }
            StaleAction::Flag => {
                for entry in inner.entries.values_mut() {
                    if !entry.stale && now - entry.last_seen > ttl {
                        entry.stale = true;
                        report.flagged += 1;
                    }
                }
            }
        }
        report
    }
}

/// Démarre le balayage périodique des nœuds silencieux
pub fn spawn_staleness_sweeper(
    registry: Arc<Registry>,
    policy: StalenessPolicy,
    tasks: &mut JoinSet<()>,
    shutdown: CancellationToken,
) {
    tasks.spawn(async move {
        let mut ticker = tokio::time::interval(policy.sweep_interval());
        info!(ttl_secs = policy.ttl_secs, action = ?policy.action, "staleness sweeper started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let report = registry.sweep(OffsetDateTime::now_utc(), &policy);
            for node_id in &report.evicted {
                info!(node_id = %node_id, "evicted stale node");
            }
            if report.flagged > 0 {
                info!(flagged = report.flagged, "flagged stale nodes");
            }
            debug!(tracked_nodes = registry.len(), "staleness sweep done");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RankingWeights;
    use headroom_devkit::snapshot_builder::epoch;
    use headroom_devkit::SnapshotBuilder;
    use std::thread;
    use time::Duration;

    fn registry() -> Registry {
        Registry::new(RankingPolicy::new(RankingWeights::default()).unwrap())
    }

    fn cpu_registry() -> Registry {
        Registry::new(
            RankingPolicy::new(RankingWeights {
                cpu: 1.0,
                memory: 0.0,
                disk: 0.0,
                network: 0.0,
                ..RankingWeights::default()
            })
            .unwrap(),
        )
    }

    fn ids(view: &[RankedNode]) -> Vec<&str> {
        view.iter().map(|n| n.node_id.as_str()).collect()
    }

    fn assert_consistent(view: &[RankedNode]) {
        let mut seen = std::collections::HashSet::new();
        for (i, node) in view.iter().enumerate() {
            assert_eq!(node.rank, i + 1);
            assert!(seen.insert(node.node_id.clone()), "duplicate {}", node.node_id);
        }
        for pair in view.windows(2) {
            let ordered = pair[0].score > pair[1].score
                || (pair[0].score == pair[1].score && pair[0].node_id < pair[1].node_id);
            assert!(ordered, "{} before {}", pair[0].node_id, pair[1].node_id);
        }
    }

    #[test]
    fn test_one_entry_per_node() {
        let reg = registry();
        for (i, id) in ["a", "b", "a", "c", "b", "a"].iter().enumerate() {
            reg.ingest(SnapshotBuilder::new(*id).cpu_idle(i as f32 * 10.0).build());
        }
        assert_eq!(reg.len(), 3);
        let view = reg.ranked_view();
        assert_eq!(view.len(), 3);
        assert_consistent(&view);
    }

    #[test]
    fn test_replace_is_wholesale() {
        let reg = registry();
        let first = reg.ingest(SnapshotBuilder::new("a").cpu_idle(10.0).disk_kb(1234).build());
        assert_eq!(first, IngestOutcome::Inserted { tracked_nodes: 1 });

        let second = reg.ingest(SnapshotBuilder::new("a").cpu_idle(80.0).build());
        assert_eq!(second, IngestOutcome::Replaced { tracked_nodes: 1 });

        let node = reg.get("a").unwrap();
        assert_eq!(node.snapshot.cpu_idle_percent, Some(80.0));
        // no field carried over from the first snapshot
        assert_eq!(node.snapshot.disk_available_kb, 0);
    }

    #[test]
    fn test_ingest_is_idempotent() {
        let reg = registry();
        let snap = SnapshotBuilder::new("a").cpu_idle(42.0).ram(100, 40).build();
        reg.ingest(snap.clone());
        let before = reg.ranked_view();
        reg.ingest(snap);
        let after = reg.ranked_view();

        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].score, after[0].score);
        assert_eq!(before[0].snapshot, after[0].snapshot);
    }

    fn contents(view: &[RankedNode]) -> Vec<(String, NodeSnapshot)> {
        view.iter().map(|n| (n.node_id.clone(), n.snapshot.clone())).collect()
    }

    #[test]
    fn test_reingest_keeps_view_content_and_order() {
        let reg = registry();
        let snaps: Vec<_> = (0..6u64)
            .map(|i| {
                SnapshotBuilder::new(format!("n{i}"))
                    .cpu_idle((i * 17 % 100) as f32)
                    .ram(1000 + i, (i * 11 % 100) as u8)
                    .disk_kb(i * 250_000)
                    .build()
            })
            .collect();
        for s in &snaps {
            reg.ingest(s.clone());
        }
        let before = reg.ranked_view();

        reg.ingest(snaps[3].clone());
        let after = reg.ranked_view();

        assert_eq!(contents(&before), contents(&after));
        assert_eq!(
            before.iter().map(|n| n.score).collect::<Vec<_>>(),
            after.iter().map(|n| n.score).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_distinct_concurrent_callers_match_sequential() {
        const CALLERS: u32 = 64;
        let snap = |i: u32| {
            SnapshotBuilder::new(format!("caller-{i:02}"))
                .cpu_idle((i * 37 % 101) as f32)
                .ram(u64::from(i), (i * 13 % 101) as u8)
                .disk_kb(u64::from(i % 7) * 100_000)
                .build()
        };

        let concurrent = Arc::new(registry());
        let handles: Vec<_> = (0..CALLERS)
            .map(|i| {
                let reg = concurrent.clone();
                thread::spawn(move || {
                    reg.ingest(snap(i));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let sequential = registry();
        for i in (0..CALLERS).rev() {
            sequential.ingest(snap(i));
        }

        let view = concurrent.ranked_view();
        assert_eq!(view.len(), CALLERS as usize);
        assert_consistent(&view);
        assert_eq!(contents(&view), contents(&sequential.ranked_view()));
    }

    #[test]
    fn test_last_arrival_wins_regardless_of_observed_at() {
        let reg = registry();
        let newer = epoch() + chrono::Duration::seconds(60);
        reg.ingest(SnapshotBuilder::new("a").cpu_idle(70.0).observed_at(newer).build());
        reg.ingest(SnapshotBuilder::new("a").cpu_idle(20.0).observed_at(epoch()).build());

        let node = reg.get("a").unwrap();
        assert_eq!(node.snapshot.cpu_idle_percent, Some(20.0));
        assert_eq!(node.snapshot.observed_at, epoch());
    }

    #[test]
    fn test_cpu_weighted_order_follows_updates() {
        let reg = cpu_registry();
        reg.ingest(SnapshotBuilder::new("a").cpu_idle(90.0).disk_kb(500_000).build());
        reg.ingest(SnapshotBuilder::new("b").cpu_idle(50.0).disk_kb(900_000).build());
        assert_eq!(ids(&reg.ranked_view()), ["a", "b"]);

        reg.ingest(SnapshotBuilder::new("a").cpu_idle(10.0).disk_kb(500_000).build());
        let view = reg.ranked_view();
        assert_eq!(ids(&view), ["b", "a"]);
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_get_reports_rank() {
        let reg = cpu_registry();
        reg.ingest(SnapshotBuilder::new("x").cpu_idle(10.0).build());
        reg.ingest(SnapshotBuilder::new("y").cpu_idle(60.0).build());
        reg.ingest(SnapshotBuilder::new("z").cpu_idle(30.0).build());

        assert_eq!(reg.get("y").unwrap().rank, 1);
        assert_eq!(reg.get("z").unwrap().rank, 2);
        assert_eq!(reg.get("x").unwrap().rank, 3);
        assert!(reg.get("missing").is_none());
    }

    #[test]
    fn test_order_independent_of_arrival() {
        let snaps: Vec<_> = (0..10)
            .map(|i| SnapshotBuilder::new(format!("n{i}")).cpu_idle(((i * 37) % 100) as f32).disk_kb(i * 1000).build())
            .collect();

        let forward = registry();
        snaps.iter().cloned().for_each(|s| {
            forward.ingest(s);
        });
        let backward = registry();
        snaps.iter().rev().cloned().for_each(|s| {
            backward.ingest(s);
        });

        assert_eq!(ids(&forward.ranked_view()), ids(&backward.ranked_view()));
    }

    #[test]
    fn test_concurrent_ingest_and_read() {
        let reg = Arc::new(registry());
        let writers: Vec<_> = (0..8)
            .map(|t| {
                let reg = reg.clone();
                thread::spawn(move || {
                    for i in 0..500u32 {
                        let id = format!("node-{}", (i + t) % 16);
                        reg.ingest(SnapshotBuilder::new(id).cpu_idle(((i * 7 + t) % 101) as f32).disk_kb(u64::from(i)).build());
                    }
                })
            })
            .collect();

        let reader = {
            let reg = reg.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    let view = reg.ranked_view();
                    assert!(view.len() <= 16);
                    assert_consistent(&view);
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();

        let view = reg.ranked_view();
        assert_eq!(view.len(), 16);
        assert_consistent(&view);
    }

    #[test]
    fn test_sweep_evicts_silent_nodes() {
        let reg = registry();
        let t0 = OffsetDateTime::now_utc();
        reg.ingest_at(SnapshotBuilder::new("old").build(), t0);
        reg.ingest_at(SnapshotBuilder::new("fresh").build(), t0 + Duration::seconds(50));

        let policy = StalenessPolicy { ttl_secs: 30, action: StaleAction::Evict, sweep_interval_secs: 5 };
        let report = reg.sweep(t0 + Duration::seconds(60), &policy);

        assert_eq!(report.evicted, vec!["old".to_string()]);
        assert_eq!(ids(&reg.ranked_view()), ["fresh"]);
    }

    #[test]
    fn test_sweep_flags_then_reingest_clears() {
        let reg = registry();
        let t0 = OffsetDateTime::now_utc();
        reg.ingest_at(SnapshotBuilder::new("a").build(), t0);

        let policy = StalenessPolicy { ttl_secs: 30, action: StaleAction::Flag, sweep_interval_secs: 5 };
        let report = reg.sweep(t0 + Duration::seconds(31), &policy);
        assert_eq!(report.flagged, 1);
        assert!(reg.get("a").unwrap().stale);
        assert_eq!(reg.len(), 1);

        // already flagged: not counted twice
        assert_eq!(reg.sweep(t0 + Duration::seconds(40), &policy).flagged, 0);

        reg.ingest_at(SnapshotBuilder::new("a").build(), t0 + Duration::seconds(41));
        assert!(!reg.get("a").unwrap().stale);
    }

    #[tokio::test]
    async fn test_sweeper_task_stops_on_cancel() {
        let reg = Arc::new(registry());
        reg.ingest_at(SnapshotBuilder::new("ghost").build(), OffsetDateTime::now_utc() - Duration::seconds(120));

        let mut tasks = JoinSet::new();
        let shutdown = CancellationToken::new();
        let policy = StalenessPolicy { ttl_secs: 60, action: StaleAction::Evict, sweep_interval_secs: 1 };
        spawn_staleness_sweeper(reg.clone(), policy, &mut tasks, shutdown.clone());

        // first tick fires immediately
        let reg_check = reg.clone();
        assert!(headroom_devkit::wait_until(std::time::Duration::from_secs(2), move || reg_check.is_empty()).await);

        shutdown.cancel();
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }
    }
}
