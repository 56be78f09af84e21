//! RAM/swap headroom and memory pressure stall, polled on demand.

use super::release::KernelVersion;
use super::SampleError;
use headroom_contracts::StallMetric;
use std::path::PathBuf;
use sysinfo::System;
use tracing::{debug, info};

const BYTES_PER_MB: u64 = 1000 * 1000;

/// Raw totals in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryTotals {
    pub total_ram: u64,
    pub available_ram: u64,
    pub total_swap: u64,
    pub free_swap: u64,
}

pub trait MemoryProbe: Send {
    fn read(&mut self) -> Result<MemoryTotals, SampleError>;
}

/// `MemoryProbe` backed by sysinfo
pub struct SysinfoMemory {
    sys: System,
}

impl SysinfoMemory {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for SysinfoMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoMemory {
    fn read(&mut self) -> Result<MemoryTotals, SampleError> {
        self.sys.refresh_memory();
        let total_ram = self.sys.total_memory();
        if total_ram == 0 {
            return Err(SampleError::MemoryUnavailable);
        }
        Ok(MemoryTotals {
            total_ram,
            available_ram: self.sys.available_memory(),
            total_swap: self.sys.total_swap(),
            free_swap: self.sys.free_swap(),
        })
    }
}

/// One memory reading as carried in a snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryReading {
    pub ram_available_mb: u64,
    pub swap_available_mb: u64,
    pub ram_available_percent: u8,
    pub swap_available_percent: u8,
    pub stall: StallMetric,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PressureSupport {
    File(PathBuf),
    Unsupported,
}

pub struct MemorySampler {
    probe: Box<dyn MemoryProbe>,
    pressure: PressureSupport,
}

impl MemorySampler {
    /// Probes pressure-stall support once from `kernel_release`; an old or
    /// unparsable release disables it for the sampler's lifetime.
    pub fn new(probe: Box<dyn MemoryProbe>, pressure_file: PathBuf, kernel_release: Option<&str>) -> Self {
        let version = kernel_release.and_then(KernelVersion::parse);
        let pressure = match version {
            Some(v) if v.supports_pressure_stall() => {
                debug!(kernel = %v, file = %pressure_file.display(), "pressure stall information enabled");
                PressureSupport::File(pressure_file)
            }
            Some(v) => {
                info!(kernel = %v, "pressure stall information not available");
                PressureSupport::Unsupported
            }
            None => {
                info!(release = ?kernel_release, "unknown kernel release, pressure stall information disabled");
                PressureSupport::Unsupported
            }
        };
        Self { probe, pressure }
    }

    /// Sampler for the running host
    pub fn for_host(pressure_file: PathBuf) -> Self {
        let release = System::kernel_version();
        Self::new(Box::new(SysinfoMemory::new()), pressure_file, release.as_deref())
    }

    pub fn pressure_supported(&self) -> bool {
        self.pressure != PressureSupport::Unsupported
    }

    pub fn sample(&mut self) -> Result<MemoryReading, SampleError> {
        let totals = self.probe.read()?;
        let stall = match &self.pressure {
            PressureSupport::File(path) => read_pressure(path),
            PressureSupport::Unsupported => StallMetric::Unsupported,
        };

        Ok(MemoryReading {
            ram_available_mb: totals.available_ram / BYTES_PER_MB,
            swap_available_mb: totals.free_swap / BYTES_PER_MB,
            ram_available_percent: percentage(totals.available_ram, totals.total_ram),
            swap_available_percent: percentage(totals.free_swap, totals.total_swap),
            stall,
        })
    }
}

fn read_pressure(path: &std::path::Path) -> StallMetric {
    match std::fs::read_to_string(path) {
        Ok(content) => match parse_pressure_avg10(&content) {
            Some(v) => StallMetric::Supported(v),
            None => {
                debug!(file = %path.display(), "pressure file without a `some avg10` entry");
                StallMetric::Unsupported
            }
        },
        Err(e) => {
            debug!(file = %path.display(), error = %e, "pressure file unreadable this cycle");
            StallMetric::Unsupported
        }
    }
}

/// `avg10` of the `some` line:
/// `some avg10=0.00 avg60=0.00 avg300=0.00 total=98028`
pub fn parse_pressure_avg10(content: &str) -> Option<f32> {
    content
        .lines()
        .find(|l| l.starts_with("some "))?
        .split_whitespace()
        .find_map(|field| field.strip_prefix("avg10="))?
        .parse()
        .ok()
}

fn percentage(part: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (part as f64 / total as f64 * 100.0).min(100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRESSURE: &str = "some avg10=23.56 avg60=0.00 avg300=0.00 total=109101\n\
                            full avg10=0.00 avg60=0.00 avg300=0.00 total=80290\n";

    struct FixedMemory(Option<MemoryTotals>);

    impl MemoryProbe for FixedMemory {
        fn read(&mut self) -> Result<MemoryTotals, SampleError> {
            self.0.ok_or(SampleError::MemoryUnavailable)
        }
    }

    fn totals() -> MemoryTotals {
        MemoryTotals {
            total_ram: 8_000_000_000,
            available_ram: 2_000_000_000,
            total_swap: 0,
            free_swap: 0,
        }
    }

    fn pressure_file() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), PRESSURE).unwrap();
        file
    }

    #[test]
    fn test_parse_pressure_avg10() {
        assert_eq!(parse_pressure_avg10(PRESSURE), Some(23.56));
        assert_eq!(parse_pressure_avg10("full avg10=1.00\n"), None);
        assert_eq!(parse_pressure_avg10("some avg10=abc\n"), None);
    }

    #[test]
    fn test_headroom_in_megabytes_and_percent() {
        let file = pressure_file();
        let mut sampler = MemorySampler::new(
            Box::new(FixedMemory(Some(totals()))),
            file.path().to_path_buf(),
            Some("6.1.0-13-amd64"),
        );

        let reading = sampler.sample().unwrap();
        assert_eq!(reading.ram_available_mb, 2000);
        assert_eq!(reading.ram_available_percent, 25);
        assert_eq!(reading.swap_available_mb, 0);
        assert_eq!(reading.swap_available_percent, 0);
        assert_eq!(reading.stall, StallMetric::Supported(23.56));
    }

    #[test]
    fn test_old_kernel_is_permanently_unsupported() {
        let file = pressure_file();
        let mut sampler = MemorySampler::new(
            Box::new(FixedMemory(Some(totals()))),
            file.path().to_path_buf(),
            Some("4.1.0-110-MANJARO"),
        );

        assert!(!sampler.pressure_supported());
        assert_eq!(sampler.sample().unwrap().stall, StallMetric::Unsupported);
        assert_eq!(sampler.sample().unwrap().stall, StallMetric::Unsupported);
    }

    #[test]
    fn test_unknown_release_disables_pressure() {
        let file = pressure_file();
        let sampler = MemorySampler::new(Box::new(FixedMemory(Some(totals()))), file.path().to_path_buf(), None);
        assert!(!sampler.pressure_supported());
    }

    #[test]
    fn test_missing_pressure_file_only_affects_stall() {
        let dir = tempfile::tempdir().unwrap();
        let mut sampler = MemorySampler::new(
            Box::new(FixedMemory(Some(totals()))),
            dir.path().join("memory"),
            Some("5.15.0-1-generic"),
        );

        let reading = sampler.sample().unwrap();
        assert_eq!(reading.stall, StallMetric::Unsupported);
        assert_eq!(reading.ram_available_mb, 2000);
        // still probed next cycle
        assert!(sampler.pressure_supported());
    }

    #[test]
    fn test_probe_failure_is_reported() {
        let file = pressure_file();
        let mut sampler = MemorySampler::new(Box::new(FixedMemory(None)), file.path().to_path_buf(), Some("6.1.0"));
        assert!(matches!(sampler.sample(), Err(SampleError::MemoryUnavailable)));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_host_probe_reads_totals() {
        let totals = SysinfoMemory::default().read().unwrap();
        assert!(totals.total_ram > 0);
    }
}
