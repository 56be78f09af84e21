//! Free space on the monitored mount, polled on demand.

use super::SampleError;
use std::path::{Path, PathBuf};
use sysinfo::Disks;

pub trait DiskProbe: Send {
    /// Bytes available to unprivileged users on the filesystem holding `path`
    fn available_bytes(&mut self, path: &Path) -> Result<u64, SampleError>;
}

/// `DiskProbe` backed by sysinfo's disk list
///
/// The mount list is read once and re-read only when no listed mount holds
/// the path; each sample refreshes the matching disk alone.
pub struct SysinfoDisks {
    disks: Disks,
}

impl SysinfoDisks {
    pub fn new() -> Self {
        Self { disks: Disks::new_with_refreshed_list() }
    }

    fn position(&self, path: &Path) -> Option<usize> {
        deepest_mount(self.disks.list().iter().map(|d| d.mount_point()), path)
    }
}

impl Default for SysinfoDisks {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskProbe for SysinfoDisks {
    fn available_bytes(&mut self, path: &Path) -> Result<u64, SampleError> {
        let idx = match self.position(path) {
            Some(idx) => idx,
            None => {
                self.disks.refresh_list();
                self.position(path).ok_or_else(|| SampleError::NoDisk(path.to_path_buf()))?
            }
        };
        let disk = &mut self.disks.list_mut()[idx];
        disk.refresh();
        Ok(disk.available_space())
    }
}

/// Index of the deepest mount point containing `path`.
pub fn deepest_mount<'a>(mounts: impl Iterator<Item = &'a Path>, path: &Path) -> Option<usize> {
    mounts
        .enumerate()
        .filter(|(_, mount)| path.starts_with(mount))
        .max_by_key(|(_, mount)| mount.components().count())
        .map(|(idx, _)| idx)
}

pub struct DiskSampler {
    probe: Box<dyn DiskProbe>,
    mount_path: PathBuf,
}

impl DiskSampler {
    pub fn new(probe: Box<dyn DiskProbe>, mount_path: PathBuf) -> Self {
        Self { probe, mount_path }
    }

    pub fn for_host(mount_path: PathBuf) -> Self {
        Self::new(Box::new(SysinfoDisks::new()), mount_path)
    }

    pub fn mount_path(&self) -> &Path {
        &self.mount_path
    }

    /// Available space in KB (1000 bytes)
    pub fn sample(&mut self) -> Result<u64, SampleError> {
        Ok(self.probe.available_bytes(&self.mount_path)? / 1000)
    }
}
