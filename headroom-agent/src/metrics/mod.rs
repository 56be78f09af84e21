//! Resource-availability samplers for headroom agents
//!
//! Two sampler shapes:
//! - windowed (CPU load, network throughput): a background task derives a
//!   rate from two reads one window apart and publishes it through a
//!   `watch` channel, one writer and any number of readers
//! - on-demand (memory, disk): polled synchronously by the assembler
//!
//! A failed read never stops a sampler. Windowed samplers keep their last
//! published value, on-demand samplers report the error for that cycle.

pub mod cpu;
pub mod disk;
pub mod memory;
pub mod network;
pub mod release;

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },
    #[error("no default route found in {0}")]
    NoDefaultRoute(PathBuf),
    #[error("interface {0} missing from counters")]
    InterfaceMissing(String),
    #[error("no mounted disk contains {0}")]
    NoDisk(PathBuf),
    #[error("memory totals unavailable")]
    MemoryUnavailable,
}

impl SampleError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        SampleError::Io { path: path.to_path_buf(), source }
    }
}

/// A metric source whose value is a rate over a sampling window.
pub trait WindowedSource: Send + 'static {
    type Reading: Send + 'static;

    /// Short name used in logs ("cpu", "network")
    fn name(&self) -> &'static str;

    /// Take one raw counter reading.
    fn read(&mut self) -> Result<Self::Reading, SampleError>;

    /// Value for the window between two good readings, `None` when the
    /// pair cannot produce one (counter reset, empty window).
    fn rate(previous: &Self::Reading, current: &Self::Reading, window: Duration) -> Option<u64>;
}

/// Read side of a windowed sampler. Reading never waits for the sampler.
#[derive(Debug, Clone)]
pub struct Latest(watch::Receiver<Option<u64>>);

impl Latest {
    /// Most recently published value, `None` until the first full window.
    pub fn get(&self) -> Option<u64> {
        *self.0.borrow()
    }

    #[cfg(test)]
    pub fn fixed(value: Option<u64>) -> Self {
        let (_tx, rx) = watch::channel(value);
        Self(rx)
    }
}

/// Spawn `source` as a background sampler owned by `tasks`, stopped by `shutdown`.
pub fn spawn_windowed<S: WindowedSource>(
    source: S,
    window: Duration,
    tasks: &mut JoinSet<()>,
    shutdown: CancellationToken,
) -> Latest {
    let (tx, rx) = watch::channel(None);
    tasks.spawn(run_windowed(source, window, tx, shutdown));
    Latest(rx)
}

async fn run_windowed<S: WindowedSource>(
    mut source: S,
    window: Duration,
    tx: watch::Sender<Option<u64>>,
    shutdown: CancellationToken,
) {
    let name = source.name();
    let mut ticker = interval(window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut previous: Option<(S::Reading, Instant)> = None;

    debug!(sampler = name, window_ms = window.as_millis() as u64, "sampler started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(sampler = name, "sampler stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        match source.read() {
            Ok(current) => {
                let now = Instant::now();
                if let Some((prev, taken_at)) = &previous {
                    match S::rate(prev, &current, now.duration_since(*taken_at)) {
                        Some(value) => {
                            tx.send_replace(Some(value));
                            trace!(sampler = name, value, "published");
                        }
                        None => debug!(sampler = name, "window skipped"),
                    }
                }
                previous = Some((current, now));
            }
            Err(e) => warn!(sampler = name, error = %e, "sample failed, keeping last value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays a fixed script of counter readings
    struct Scripted(VecDeque<Result<u64, SampleError>>);

    impl WindowedSource for Scripted {
        type Reading = u64;

        fn name(&self) -> &'static str {
            "scripted"
        }

        fn read(&mut self) -> Result<u64, SampleError> {
            self.0.pop_front().unwrap_or(Err(SampleError::MemoryUnavailable))
        }

        fn rate(previous: &u64, current: &u64, _window: Duration) -> Option<u64> {
            current.checked_sub(*previous)
        }
    }

    async fn wait_for(latest: &Latest, expected: Option<u64>) {
        for _ in 0..200 {
            if latest.get() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("sampler never published {expected:?}, last {:?}", latest.get());
    }

    #[tokio::test]
    async fn test_publishes_rate_after_two_reads() {
        let mut tasks = JoinSet::new();
        let shutdown = CancellationToken::new();
        let source = Scripted(VecDeque::from(vec![Ok(10), Ok(25)]));

        let latest = spawn_windowed(source, Duration::from_millis(10), &mut tasks, shutdown.clone());
        assert_eq!(latest.get(), None);
        wait_for(&latest, Some(15)).await;

        shutdown.cancel();
        while tasks.join_next().await.is_some() {}
    }

    #[tokio::test]
    async fn test_failed_read_keeps_last_value() {
        let mut tasks = JoinSet::new();
        let shutdown = CancellationToken::new();
        let source = Scripted(VecDeque::from(vec![
            Ok(100),
            Ok(140),
            Err(SampleError::MemoryUnavailable),
            Err(SampleError::MemoryUnavailable),
        ]));

        let latest = spawn_windowed(source, Duration::from_millis(10), &mut tasks, shutdown.clone());
        wait_for(&latest, Some(40)).await;
        // script exhausted: every further read fails
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(latest.get(), Some(40));

        shutdown.cancel();
        while tasks.join_next().await.is_some() {}
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_baseline() {
        let mut tasks = JoinSet::new();
        let shutdown = CancellationToken::new();
        let source = Scripted(VecDeque::from(vec![
            Ok(100),
            Err(SampleError::MemoryUnavailable),
            Ok(130),
        ]));

        let latest = spawn_windowed(source, Duration::from_millis(10), &mut tasks, shutdown.clone());
        wait_for(&latest, Some(30)).await;

        shutdown.cancel();
        while tasks.join_next().await.is_some() {}
    }

    #[tokio::test]
    async fn test_cancel_stops_sampler() {
        let mut tasks = JoinSet::new();
        let shutdown = CancellationToken::new();
        let source = Scripted(VecDeque::new());

        let _latest = spawn_windowed(source, Duration::from_secs(3600), &mut tasks, shutdown.clone());
        shutdown.cancel();

        let joined = tokio::time::timeout(Duration::from_secs(1), tasks.join_next()).await;
        assert!(matches!(joined, Ok(Some(Ok(())))));
    }
}
