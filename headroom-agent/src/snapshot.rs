//! Snapshot assembly
//!
//! Composes one `NodeSnapshot` from whatever the samplers last published.
//! Assembly never waits on a sampler and never fails: a memory or disk read
//! error leaves those fields at their defaults for this snapshot only.

use crate::metrics::disk::DiskSampler;
use crate::metrics::memory::MemorySampler;
use crate::metrics::Latest;
use chrono::{DateTime, Duration, Utc};
use headroom_contracts::snapshot::cpu_idle_from_load;
use headroom_contracts::NodeSnapshot;
use tracing::warn;

pub struct SnapshotAssembler {
    node_id: String,
    cpu_load: Latest,
    bandwidth: Latest,
    memory: MemorySampler,
    disk: DiskSampler,
    last_observed: Option<DateTime<Utc>>,
}

impl SnapshotAssembler {
    pub fn new(node_id: String, cpu_load: Latest, bandwidth: Latest, memory: MemorySampler, disk: DiskSampler) -> Self {
        Self {
            node_id,
            cpu_load,
            bandwidth,
            memory,
            disk,
            last_observed: None,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn assemble(&mut self) -> NodeSnapshot {
        let observed_at = self.next_timestamp();
        let mut snapshot = NodeSnapshot::empty(self.node_id.clone(), observed_at);

        snapshot.cpu_idle_percent = self
            .cpu_load
            .get()
            .map(|load| cpu_idle_from_load(u32::try_from(load).unwrap_or(u32::MAX)));
        snapshot.network_bandwidth_bps = self.bandwidth.get().unwrap_or(0);

        match self.memory.sample() {
            Ok(mem) => {
                snapshot.ram_available_mb = mem.ram_available_mb;
                snapshot.swap_available_mb = mem.swap_available_mb;
                snapshot.ram_available_percent = mem.ram_available_percent;
                snapshot.swap_available_percent = mem.swap_available_percent;
                snapshot.memory_stall_avg_us = mem.stall;
            }
            Err(e) => warn!(error = %e, "memory info update failed"),
        }

        match self.disk.sample() {
            Ok(kb) => snapshot.disk_available_kb = kb,
            Err(e) => warn!(error = %e, mount = %self.disk.mount_path().display(), "disk info update failed"),
        }

        snapshot
    }

    /// Wall clock, bumped so it is strictly increasing within this process
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_observed {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_observed = Some(stamp);
        stamp
    }
}
