//! Drive slots and free-space probing
//!
//! A `DriveSlot` caches the total/available space of one drive root and
//! remembers when it was last probed, so capacity decisions can tell a fresh
//! figure from a stale one.

use std::path::{Path, PathBuf};
use std::time::Instant;
use tierio_common::{DriveRole, Error, Result};

/// A single drive in the pool with its cached space figures
#[derive(Debug, Clone)]
pub struct DriveSlot {
    /// Root directory of the drive
    pub path: PathBuf,
    /// Pair identifier shared with the other drive of the pair
    pub drive_number: u32,
    /// Primary or mirror
    pub role: DriveRole,
    /// Total capacity in bytes
    pub total_space: u64,
    /// Bytes available to the engine
    pub available_space: u64,
    /// When the figures above were last read from the filesystem
    pub last_updated: Instant,
}

impl DriveSlot {
    /// Probe a drive root and build a fresh slot
    pub fn probe(path: impl Into<PathBuf>, drive_number: u32, role: DriveRole) -> Result<Self> {
        let path = path.into();
        if !path.is_dir() {
            return Err(Error::configuration(format!(
                "drive path is not a directory: {}",
                path.display()
            )));
        }
        let (total_space, available_space) = filesystem_space(&path)?;
        Ok(Self {
            path,
            drive_number,
            role,
            total_space,
            available_space,
            last_updated: Instant::now(),
        })
    }

    /// Overwrite the cached figures with a fresh probe result
    pub fn apply_probe(&mut self, total: u64, available: u64) {
        self.total_space = total;
        self.available_space = available;
        self.last_updated = Instant::now();
    }

    /// Percentage of the drive in use (0.0 to 100.0)
    #[must_use]
    pub fn usage_pct(&self) -> f64 {
        if self.total_space == 0 {
            return 0.0;
        }
        let used = self.total_space.saturating_sub(self.available_space);
        used as f64 / self.total_space as f64 * 100.0
    }

    /// Whether the cached figures are older than `max_age`
    #[must_use]
    pub fn is_stale(&self, max_age: std::time::Duration) -> bool {
        self.last_updated.elapsed() > max_age
    }
}

/// Read (total, available) bytes for the filesystem holding `path`
#[cfg(unix)]
pub fn filesystem_space(path: &Path) -> Result<(u64, u64)> {
    let stat = nix::sys::statvfs::statvfs(path)
        .map_err(|e| Error::Io(std::io::Error::from_raw_os_error(e as i32)))?;
    let frag = stat.fragment_size() as u64;
    let total = stat.blocks() as u64 * frag;
    let available = stat.blocks_available() as u64 * frag;
    Ok((total, available))
}

#[cfg(not(unix))]
pub fn filesystem_space(_path: &Path) -> Result<(u64, u64)> {
    Err(Error::storage("free-space probing is only supported on unix"))
}
