//! Headroom Agent - per-node free-capacity reporter
//!
//! This agent feeds the headroom kernel's ranked node view:
//! - Background samplers for CPU load and network throughput
//! - On-demand memory/swap headroom, pressure stall and disk free space
//! - Periodic at-most-once snapshot push to the kernel (`POST /stats`)

mod config;
mod discovery;
mod metrics;
mod snapshot;
mod transmitter;

use anyhow::{Context, Result};
use config::AgentConfig;
use metrics::cpu::ProcStatSource;
use metrics::disk::DiskSampler;
use metrics::memory::MemorySampler;
use metrics::network::NetDevSource;
use snapshot::SnapshotAssembler;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use transmitter::Transmitter;

/// Running agent: every background task plus the token that stops them
struct Agent {
    tasks: JoinSet<()>,
    shutdown: CancellationToken,
}

impl Agent {
    /// Spawn samplers and the transmission loop
    fn start(config: &AgentConfig, node_id: String) -> Result<Self> {
        let shutdown = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let window = config.sample_window();

        let cpu_load = metrics::spawn_windowed(
            ProcStatSource::new(&config.proc_stat_path),
            window,
            &mut tasks,
            shutdown.clone(),
        );
        let bandwidth = metrics::spawn_windowed(
            NetDevSource::new(&config.net_route_path, &config.net_dev_path),
            window,
            &mut tasks,
            shutdown.clone(),
        );

        let memory = MemorySampler::for_host(config.pressure_file.clone());
        info!(pressure_stall = memory.pressure_supported(), "memory sampler ready");
        let disk = DiskSampler::for_host(config.disk_mount_path.clone());

        let assembler = SnapshotAssembler::new(node_id, cpu_load, bandwidth, memory, disk);

        let transmitter = Transmitter::new(&config.collector_url, config.transmit_interval(), config.request_timeout())
            .context("Failed to build HTTP client")?;
        info!(node_id = assembler.node_id(), endpoint = transmitter.endpoint(), "agent started");
        tasks.spawn(transmitter.run(assembler, shutdown.clone()));

        Ok(Self { tasks, shutdown })
    }

    /// Cancel every task and wait for all of them to finish
    async fn stop(mut self) {
        self.shutdown.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "agent task failed");
            }
        }
        info!("agent stopped");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Headroom Agent starting...");

    let config = AgentConfig::load().await.context("Failed to load agent config")?;
    let node_id = discovery::discover_node_id(config.node_id.as_deref())
        .context("Failed to determine node identity")?;

    let agent = Agent::start(&config, node_id)?;

    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    info!("shutdown requested");
    agent.stop().await;

    Ok(())
}
