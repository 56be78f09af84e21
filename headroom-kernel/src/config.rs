use crate::ranking::RankingPolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const CONFIG_ENV: &str = "HEADROOM_KERNEL_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid ranking weights: {0}")]
    Weights(String),
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: SocketAddr,
    pub ranking: RankingWeights,
    /// No eviction nor flagging when absent
    pub staleness: Option<StalenessPolicy>,
    pub mqtt: Option<MqttConf>,
}

/// Weights of each capacity dimension in the node score
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RankingWeights {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub network: f64,
    /// Free space scoring 0.5 on the disk dimension
    pub disk_reference_kb: f64,
    /// Throughput scoring 0.5 on the network dimension
    pub network_reference_bps: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StaleAction {
    Evict,
    Flag,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub ttl_secs: u64,
    pub action: StaleAction,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_publish_interval")]
    pub publish_interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_topic() -> String {
    "headroom/nodes/ranking@v1".into()
}

fn default_publish_interval() -> u64 {
    30
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 50051)),
            ranking: RankingWeights::default(),
            staleness: None,
            mqtt: None,
        }
    }
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            cpu: 0.4,
            memory: 0.3,
            disk: 0.2,
            network: 0.1,
            disk_reference_kb: 100_000_000.0,    // 100 GB
            network_reference_bps: 12_500_000.0, // 100 Mbit/s
        }
    }
}

impl StalenessPolicy {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl KernelConfig {
    fn validated(self) -> Result<Self, ConfigError> {
        RankingPolicy::new(self.ranking)?;
        if let Some(staleness) = &self.staleness {
            if staleness.ttl_secs == 0 {
                return Err(ConfigError::ZeroInterval("staleness.ttl_secs"));
            }
            if staleness.sweep_interval_secs == 0 {
                return Err(ConfigError::ZeroInterval("staleness.sweep_interval_secs"));
            }
        }
        if let Some(mqtt) = &self.mqtt {
            if mqtt.publish_interval_secs == 0 {
                return Err(ConfigError::ZeroInterval("mqtt.publish_interval_secs"));
            }
        }
        Ok(self)
    }
}

/// Charge `$HEADROOM_KERNEL_CONFIG` (ou `kernel.yaml`), défauts si absent
pub async fn load_config() -> Result<KernelConfig, ConfigError> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "kernel.yaml".into());
    load_config_from(Path::new(&path)).await
}

pub async fn load_config_from(path: &Path) -> Result<KernelConfig, ConfigError> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "no kernel config, using defaults");
        return KernelConfig::default().validated();
    }

    let txt = fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    if txt.trim().is_empty() {
        return KernelConfig::default().validated();
    }
    let cfg: KernelConfig = serde_yaml::from_str(&txt)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
    cfg.validated()
}
