//! Agent configuration
//!
//! Loaded from TOML, either at `$HEADROOM_AGENT_CONFIG` or the OS-specific
//! config directory. Every option has a default and none depends on another.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "HEADROOM_AGENT_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not locate a config directory")]
    NoConfigDir,
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
        source: toml::de::Error,
    },
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of the kernel, e.g. `http://10.0.0.2:50051`
    pub collector_url: String,
    pub transmit_interval_secs: u64,
    /// Window over which CPU load and network throughput are averaged
    pub sample_window_secs: u64,
    pub request_timeout_ms: u64,
    pub disk_mount_path: PathBuf,
    pub pressure_file: PathBuf,
    pub proc_stat_path: PathBuf,
    pub net_dev_path: PathBuf,
    pub net_route_path: PathBuf,
    /// Overrides the hostname as node identity
    pub node_id: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            collector_url: "http://127.0.0.1:50051".to_string(),
            transmit_interval_secs: 5,
            sample_window_secs: 5,
            request_timeout_ms: 2000,
            disk_mount_path: PathBuf::from("/"),
            pressure_file: PathBuf::from("/proc/pressure/memory"),
            proc_stat_path: PathBuf::from("/proc/stat"),
            net_dev_path: PathBuf::from("/proc/net/dev"),
            net_route_path: PathBuf::from("/proc/net/route"),
            node_id: None,
        }
    }
}

impl AgentConfig {
    /// Load config from `$HEADROOM_AGENT_CONFIG` or the OS config dir.
    /// A missing file yields the defaults.
    pub async fn load() -> Result<Self, ConfigError> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(p) => PathBuf::from(p),
            None => Self::config_file_path()?,
        };
        Self::load_from(&path).await
    }

    pub async fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no agent config file, using defaults");
            return Self::default().validated();
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config: AgentConfig = toml::from_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.validated()
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push("headroom-agent");
        path.push("config.toml");
        Ok(path)
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.transmit_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval("transmit_interval_secs"));
        }
        if self.sample_window_secs == 0 {
            return Err(ConfigError::ZeroInterval("sample_window_secs"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroInterval("request_timeout_ms"));
        }
        Ok(self)
    }

    pub fn transmit_interval(&self) -> Duration {
        Duration::from_secs(self.transmit_interval_secs)
    }

    pub fn sample_window(&self) -> Duration {
        Duration::from_secs(self.sample_window_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
