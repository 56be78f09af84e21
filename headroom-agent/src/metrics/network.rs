//! Network throughput on the default-route interface.

use super::{SampleError, WindowedSource};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Cumulative byte counters of one interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetCounters {
    pub interface: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// First interface with a `00000000` destination in `/proc/net/route`.
pub fn parse_default_route(content: &str) -> Option<String> {
    content.lines().skip(1).find_map(|line| {
        let mut fields = line.split_whitespace();
        let iface = fields.next()?;
        (fields.next()? == "00000000").then(|| iface.to_string())
    })
}

/// Byte counters for `interface` from `/proc/net/dev`.
pub fn parse_net_dev(content: &str, interface: &str) -> Result<NetCounters, SampleError> {
    let fields = content
        .lines()
        .skip(2)
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim() == interface)
        .map(|(_, rest)| rest.split_whitespace().collect::<Vec<_>>())
        .ok_or_else(|| SampleError::InterfaceMissing(interface.to_string()))?;

    if fields.len() < 9 {
        return Err(SampleError::Malformed {
            what: "net dev",
            detail: format!("{interface} has {} fields", fields.len()),
        });
    }

    let counter = |idx: usize| {
        fields[idx].parse::<u64>().map_err(|e| SampleError::Malformed {
            what: "net dev",
            detail: format!("{interface} field {idx}: {e}"),
        })
    };

    Ok(NetCounters {
        interface: interface.to_string(),
        rx_bytes: counter(0)?,
        tx_bytes: counter(8)?,
    })
}

/// Average bytes per second between two readings of the same interface.
pub fn throughput_between(previous: &NetCounters, current: &NetCounters, window: Duration) -> Option<u64> {
    if previous.interface != current.interface {
        return None;
    }
    let secs = window.as_secs_f64();
    if secs <= 0.0 {
        return None;
    }
    let before = previous.rx_bytes.checked_add(previous.tx_bytes)?;
    let after = current.rx_bytes.checked_add(current.tx_bytes)?;
    let delta = after.checked_sub(before)?;
    Some((delta as f64 / secs) as u64)
}

/// Reads the default-route interface counters. The interface is resolved
/// lazily and re-resolved when it disappears from the counter file.
pub struct NetDevSource {
    route_path: PathBuf,
    dev_path: PathBuf,
    interface: Option<String>,
}

impl NetDevSource {
    pub fn new(route_path: impl Into<PathBuf>, dev_path: impl Into<PathBuf>) -> Self {
        Self {
            route_path: route_path.into(),
            dev_path: dev_path.into(),
            interface: None,
        }
    }

    fn resolve_interface(&mut self) -> Result<String, SampleError> {
        if let Some(iface) = &self.interface {
            return Ok(iface.clone());
        }
        let routes = read(&self.route_path)?;
        let iface = parse_default_route(&routes)
            .ok_or_else(|| SampleError::NoDefaultRoute(self.route_path.clone()))?;
        info!(interface = %iface, "monitoring default route interface");
        self.interface = Some(iface.clone());
        Ok(iface)
    }
}

fn read(path: &Path) -> Result<String, SampleError> {
    std::fs::read_to_string(path).map_err(|e| SampleError::io(path, e))
}

impl WindowedSource for NetDevSource {
    type Reading = NetCounters;

    fn name(&self) -> &'static str {
        "network"
    }

    fn read(&mut self) -> Result<NetCounters, SampleError> {
        let iface = self.resolve_interface()?;
        let counters = read(&self.dev_path)?;
        let result = parse_net_dev(&counters, &iface);
        if let Err(SampleError::InterfaceMissing(_)) = &result {
            self.interface = None;
        }
        result
    }

    fn rate(previous: &NetCounters, current: &NetCounters, window: Duration) -> Option<u64> {
        throughput_between(previous, current, window)
    }
}
