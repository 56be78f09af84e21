use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ContractError;

/// Upper bound of the agent's CPU load scale (load percent x 100)
pub const CPU_LOAD_SCALE: u32 = 10_000;

/// One point-in-time bundle of a node's resource availability.
///
/// Fields are sampled independently by the agent, so cross-field
/// consistency only holds within one sampling window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub node_id: String,
    /// `None` when the CPU sampler has not produced a window yet
    pub cpu_idle_percent: Option<f32>,
    pub ram_available_mb: u64,
    pub swap_available_mb: u64,
    pub ram_available_percent: u8,
    pub swap_available_percent: u8,
    pub disk_available_kb: u64,
    /// Average rx+tx over the last sampling window
    pub network_bandwidth_bps: u64,
    pub memory_stall_avg_us: StallMetric,
    pub observed_at: DateTime<Utc>,
}

impl NodeSnapshot {
    /// Empty snapshot for `node_id`: every metric at its "nothing known" value
    pub fn empty(node_id: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            node_id: node_id.into(),
            cpu_idle_percent: None,
            ram_available_mb: 0,
            swap_available_mb: 0,
            ram_available_percent: 0,
            swap_available_percent: 0,
            disk_available_kb: 0,
            network_bandwidth_bps: 0,
            memory_stall_avg_us: StallMetric::Unsupported,
            observed_at,
        }
    }

    pub fn from_json(payload: &[u8]) -> Result<Self, ContractError> {
        serde_json::from_slice(payload).map_err(ContractError::Decode)
    }
}

/// Converts the agent's load scale (`[0, 10000]`) into an idle percentage.
pub fn cpu_idle_from_load(load: u32) -> f32 {
    let load = load.min(CPU_LOAD_SCALE) as f32;
    (100.0 - load / 100.0).clamp(0.0, 100.0)
}

/// Memory pressure stall average; `Unsupported` when the kernel lacks PSI.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum StallMetric {
    Supported(f32),
    #[default]
    Unsupported,
}

impl StallMetric {
    pub fn value(&self) -> Option<f32> {
        match self {
            StallMetric::Supported(v) => Some(*v),
            StallMetric::Unsupported => None,
        }
    }
}

const UNSUPPORTED: &str = "unsupported";

impl Serialize for StallMetric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StallMetric::Supported(v) => serializer.serialize_f32(*v),
            StallMetric::Unsupported => serializer.serialize_str(UNSUPPORTED),
        }
    }
}

impl<'de> Deserialize<'de> for StallMetric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Ok(StallMetric::Supported(v)),
            Raw::Text(s) if s == UNSUPPORTED => Ok(StallMetric::Unsupported),
            Raw::Text(s) => Err(serde::de::Error::custom(format!(
                "expected a number or \"{UNSUPPORTED}\", got \"{s}\""
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> NodeSnapshot {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        NodeSnapshot {
            cpu_idle_percent: Some(87.5),
            ram_available_mb: 2048,
            ram_available_percent: 40,
            disk_available_kb: 500_000,
            memory_stall_avg_us: StallMetric::Supported(23.56),
            ..NodeSnapshot::empty("node-a", ts)
        }
    }

    #[test]
    fn test_snapshot_wire_field_names() {
        let json: serde_json::Value = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["node_id"], "node-a");
        assert_eq!(json["cpu_idle_percent"], 87.5);
        assert_eq!(json["disk_available_kb"], 500_000);
        assert_eq!(json["observed_at"], "2024-03-01T12:00:00Z");
    }

    #[test]
    fn test_stall_metric_sentinel() {
        let unsupported = serde_json::to_string(&StallMetric::Unsupported).unwrap();
        assert_eq!(unsupported, "\"unsupported\"");
        let parsed: StallMetric = serde_json::from_str("\"unsupported\"").unwrap();
        assert_eq!(parsed, StallMetric::Unsupported);
        let parsed: StallMetric = serde_json::from_str("1.5").unwrap();
        assert_eq!(parsed.value(), Some(1.5));
        assert!(serde_json::from_str::<StallMetric>("\"maybe\"").is_err());
    }

    #[test]
    fn test_missing_cpu_is_null() {
        let snap = NodeSnapshot::empty("n", Utc::now());
        let json: serde_json::Value = serde_json::to_value(&snap).unwrap();
        assert!(json["cpu_idle_percent"].is_null());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = NodeSnapshot::from_json(b"{\"node_id\": 3}").unwrap_err();
        assert!(matches!(err, ContractError::Decode(_)));
    }

    #[test]
    fn test_cpu_idle_from_load() {
        assert_eq!(cpu_idle_from_load(0), 100.0);
        assert_eq!(cpu_idle_from_load(2500), 75.0);
        assert_eq!(cpu_idle_from_load(10_000), 0.0);
        assert_eq!(cpu_idle_from_load(60_000), 0.0);
    }
}
