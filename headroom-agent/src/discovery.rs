//! Node identity discovery
//!
//! The node id is the configured override, else the hostname. An agent that
//! cannot name itself must not start.

use anyhow::{bail, Result};
use tracing::info;

pub fn discover_node_id(override_id: Option<&str>) -> Result<String> {
    if let Some(id) = override_id.map(str::trim).filter(|id| !id.is_empty()) {
        info!(node_id = id, "using configured node id");
        return Ok(id.to_string());
    }

    let hostname = gethostname::gethostname().to_string_lossy().trim().to_string();
    if hostname.is_empty() {
        bail!("hostname is empty and no node_id is configured");
    }
    info!(node_id = %hostname, "using hostname as node id");
    Ok(hostname)
}
