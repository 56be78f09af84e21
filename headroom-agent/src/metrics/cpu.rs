//! CPU load from the kernel's aggregate `cpu` counters.

use super::{SampleError, WindowedSource};
use headroom_contracts::snapshot::CPU_LOAD_SCALE;
use std::path::PathBuf;
use std::time::Duration;

/// Cumulative idle and total jiffies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

/// Parse the aggregate `cpu ` line of `/proc/stat`.
pub fn parse_proc_stat(content: &str) -> Result<CpuTimes, SampleError> {
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| SampleError::Malformed {
            what: "proc stat",
            detail: "no aggregate cpu line".into(),
        })?;

    let times = line
        .split_whitespace()
        .skip(1)
        .map(str::parse::<u64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SampleError::Malformed { what: "proc stat", detail: e.to_string() })?;

    if times.len() < 4 {
        return Err(SampleError::Malformed {
            what: "proc stat",
            detail: format!("expected at least 4 counters, got {}", times.len()),
        });
    }

    Ok(CpuTimes {
        idle: times[3],
        total: times.iter().sum(),
    })
}

/// Load over a window on the `[0, 10000]` scale (percent x 100).
pub fn load_between(previous: &CpuTimes, current: &CpuTimes) -> Option<u64> {
    let total = current.total.checked_sub(previous.total)?;
    if total == 0 {
        return None;
    }
    let idle = current.idle.saturating_sub(previous.idle).min(total);
    let load = CPU_LOAD_SCALE as f64 * (1.0 - idle as f64 / total as f64);
    Some(load.round() as u64)
}

pub struct ProcStatSource {
    path: PathBuf,
}

impl ProcStatSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WindowedSource for ProcStatSource {
    type Reading = CpuTimes;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn read(&mut self) -> Result<CpuTimes, SampleError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| SampleError::io(&self.path, e))?;
        parse_proc_stat(&content)
    }

    fn rate(previous: &CpuTimes, current: &CpuTimes, _window: Duration) -> Option<u64> {
        load_between(previous, current)
    }
}
