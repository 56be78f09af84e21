//! Kernel release parsing, used to probe for pressure stall information.

use std::fmt;

/// `major.minor` of a Linux release string
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KernelVersion {
    pub major: u8,
    pub minor: u8,
}

/// Pressure stall information landed in Linux 4.20
pub const PSI_MIN_VERSION: KernelVersion = KernelVersion::new(4, 20);

impl KernelVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Extract `major.minor` from a release as printed by `uname -r`,
    /// e.g. `5.4.0-110-generic`. Needs at least `X.Y.` with byte-sized components.
    pub fn parse(release: &str) -> Option<Self> {
        let mut parts = release.splitn(3, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        // a patch component (possibly empty) must follow
        parts.next()?;
        Some(Self { major, minor })
    }

    pub fn supports_pressure_stall(&self) -> bool {
        *self >= PSI_MIN_VERSION
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Linux {}.{}", self.major, self.minor)
    }
}
