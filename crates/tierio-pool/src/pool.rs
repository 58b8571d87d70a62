//! Drive pool: pair registry, capacity-aware selection, usage counters
//!
//! Selection scans primary drives in round-robin order starting after the
//! last-selected index. The cursor is a plain atomic counter, so concurrent
//! callers never collide on a read-modify-write; a race costs at worst a
//! slightly suboptimal (but still valid) pick.

use crate::slot::DriveSlot;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tierio_common::{DrivePairConfig, DriveRole, Error, Result, StorageConfig, Tier};
use tracing::debug;

/// Per-drive usage bookkeeping, updated after confirmed writes
#[derive(Debug, Default)]
pub struct UsageCounter {
    /// Bytes written minus bytes deleted
    pub used_space: AtomicU64,
    /// Number of confirmed writes
    pub write_count: AtomicU64,
    /// Unix timestamp of the last confirmed write
    pub last_write_epoch_secs: AtomicU64,
}

impl UsageCounter {
    fn apply(&self, delta: i64) {
        if delta >= 0 {
            self.used_space.fetch_add(delta as u64, Ordering::Relaxed);
        } else {
            let give_back = delta.unsigned_abs();
            // Saturating: a delete racing a restart must not underflow
            let mut current = self.used_space.load(Ordering::Relaxed);
            loop {
                let next = current.saturating_sub(give_back);
                match self.used_space.compare_exchange_weak(
                    current,
                    next,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break,
                    Err(observed) => current = observed,
                }
            }
        }
    }

    fn mark_write(&self) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.last_write_epoch_secs.store(now, Ordering::Relaxed);
    }
}

/// Lightweight handle to a selected pair, used by the mirrored store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrivePairHandle {
    /// Identifier shared by both drives
    pub drive_number: u32,
    /// Root of the primary drive
    pub primary_root: PathBuf,
    /// Root of the mirror drive
    pub mirror_root: PathBuf,
}

/// Point-in-time usage figures for one drive
#[derive(Debug, Clone)]
pub struct DriveUsage {
    pub path: PathBuf,
    pub drive_number: u32,
    pub role: DriveRole,
    pub total_space: u64,
    pub available_space: u64,
    pub used_space: u64,
    pub write_count: u64,
}

struct PairState {
    drive_number: u32,
    primary: RwLock<DriveSlot>,
    mirror: RwLock<DriveSlot>,
}

/// The pool of primary/mirror drive pairs
pub struct DrivePool {
    pairs: Vec<PairState>,
    usage: HashMap<PathBuf, UsageCounter>,
    cursor: AtomicUsize,
    fast_access_threshold: u64,
    reserved_free_space: u64,
    refresh_max_age: Duration,
}

impl DrivePool {
    /// Build a pool from configured pairs, probing every drive once
    ///
    /// Creates the tier folders on every drive so later writes never race on
    /// directory creation.
    pub fn new(
        drives: &[DrivePairConfig],
        storage: &StorageConfig,
        refresh_max_age: Duration,
    ) -> Result<Self> {
        if drives.is_empty() {
            return Err(Error::configuration("drive pool requires at least one pair"));
        }

        let mut pairs = Vec::with_capacity(drives.len());
        let mut usage = HashMap::new();
        for pair in drives {
            for root in [&pair.primary_path, &pair.mirror_path] {
                for tier in [Tier::FastAccess, Tier::Archive] {
                    std::fs::create_dir_all(root.join(tier.folder_name()))?;
                }
                usage.insert(root.clone(), UsageCounter::default());
            }
            let primary =
                DriveSlot::probe(&pair.primary_path, pair.drive_number, DriveRole::Primary)?;
            let mirror = DriveSlot::probe(&pair.mirror_path, pair.drive_number, DriveRole::Mirror)?;
            pairs.push(PairState {
                drive_number: pair.drive_number,
                primary: RwLock::new(primary),
                mirror: RwLock::new(mirror),
            });
        }

        Ok(Self {
            pairs,
            usage,
            cursor: AtomicUsize::new(0),
            fast_access_threshold: storage.fast_access_threshold,
            reserved_free_space: storage.reserved_free_space,
            refresh_max_age,
        })
    }

    /// Number of configured pairs
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The configured reserve every primary must keep free
    #[must_use]
    pub fn reserved_free_space(&self) -> u64 {
        self.reserved_free_space
    }

    /// Tier for a payload of `size` bytes
    #[must_use]
    pub fn tier_for(&self, size: u64) -> Tier {
        Tier::for_size(size, self.fast_access_threshold)
    }

    /// Pick the pair that should host `size` bytes
    ///
    /// Scans primaries round-robin starting after the last-selected index and
    /// returns the first pair whose primary can hold the payload plus the
    /// configured reserve. Cached free-space figures older than one sampling
    /// interval are re-probed before being trusted.
    pub fn select_drive(&self, size: u64) -> Result<DrivePairHandle> {
        let n = self.pairs.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % n;

        let Some(needed) = size.checked_add(self.reserved_free_space) else {
            return Err(Error::NoCapacity {
                required: size,
                reserve: self.reserved_free_space,
            });
        };

        for i in 0..n {
            let state = &self.pairs[(start + i) % n];
            let available = {
                let slot = state.primary.read();
                if slot.is_stale(self.refresh_max_age) {
                    drop(slot);
                    refresh_slot(&state.primary)?.available_space
                } else {
                    slot.available_space
                }
            };
            if available >= needed {
                debug!(
                    drive_number = state.drive_number,
                    size, available, "selected drive pair"
                );
                return Ok(self.handle(state));
            }
        }

        Err(Error::NoCapacity {
            required: size,
            reserve: self.reserved_free_space,
        })
    }

    /// Record a space delta for a drive
    ///
    /// Purely in-memory; never blocks on I/O.
    pub fn record_usage(&self, drive_path: &Path, delta: i64) {
        if let Some(counter) = self.usage.get(drive_path) {
            counter.apply(delta);
        }
    }

    /// Record a confirmed write: applies the space delta, bumps the write
    /// count, and stamps the last-write time
    pub fn record_write(&self, drive_path: &Path, delta: i64) {
        if let Some(counter) = self.usage.get(drive_path) {
            counter.apply(delta);
            counter.mark_write();
        }
    }

    /// Re-read live space figures for one drive
    pub fn refresh(&self, drive_path: &Path) -> Result<DriveSlot> {
        for state in &self.pairs {
            for lock in [&state.primary, &state.mirror] {
                if lock.read().path == drive_path {
                    return refresh_slot(lock);
                }
            }
        }
        Err(Error::storage(format!(
            "unknown drive path: {}",
            drive_path.display()
        )))
    }

    /// Handles to every configured pair, in configuration order
    #[must_use]
    pub fn pairs(&self) -> Vec<DrivePairHandle> {
        self.pairs.iter().map(|s| self.handle(s)).collect()
    }

    /// Handle for a pair by drive number
    #[must_use]
    pub fn pair(&self, drive_number: u32) -> Option<DrivePairHandle> {
        self.pairs
            .iter()
            .find(|s| s.drive_number == drive_number)
            .map(|s| self.handle(s))
    }

    /// Root paths of every configured drive, primaries then mirror per pair
    #[must_use]
    pub fn drive_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(self.pairs.len() * 2);
        for state in &self.pairs {
            paths.push(state.primary.read().path.clone());
            paths.push(state.mirror.read().path.clone());
        }
        paths
    }

    /// Point-in-time usage for every drive
    #[must_use]
    pub fn snapshot(&self) -> Vec<DriveUsage> {
        let mut out = Vec::with_capacity(self.pairs.len() * 2);
        for state in &self.pairs {
            for lock in [&state.primary, &state.mirror] {
                let slot = lock.read();
                let counter = self.usage.get(&slot.path);
                out.push(DriveUsage {
                    path: slot.path.clone(),
                    drive_number: slot.drive_number,
                    role: slot.role,
                    total_space: slot.total_space,
                    available_space: slot.available_space,
                    used_space: counter
                        .map(|c| c.used_space.load(Ordering::Relaxed))
                        .unwrap_or(0),
                    write_count: counter
                        .map(|c| c.write_count.load(Ordering::Relaxed))
                        .unwrap_or(0),
                });
            }
        }
        out
    }

    fn handle(&self, state: &PairState) -> DrivePairHandle {
        DrivePairHandle {
            drive_number: state.drive_number,
            primary_root: state.primary.read().path.clone(),
            mirror_root: state.mirror.read().path.clone(),
        }
    }
}

/// Probe the filesystem outside the lock, then publish the fresh figures
fn refresh_slot(lock: &RwLock<DriveSlot>) -> Result<DriveSlot> {
    let path = lock.read().path.clone();
    let (total, available) = crate::slot::filesystem_space(&path)?;
    let mut slot = lock.write();
    slot.apply_probe(total, available);
    Ok(slot.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};
    use tierio_common::DrivePairConfig;

    fn test_pool(reserve: u64, pairs: u32) -> (DrivePool, Vec<TempDir>) {
        let mut dirs = Vec::new();
        let mut configs = Vec::new();
        for n in 1..=pairs {
            let primary = tempdir().unwrap();
            let mirror = tempdir().unwrap();
            configs.push(DrivePairConfig {
                drive_number: n,
                primary_path: primary.path().to_path_buf(),
                mirror_path: mirror.path().to_path_buf(),
            });
            dirs.push(primary);
            dirs.push(mirror);
        }
        let storage = StorageConfig {
            reserved_free_space: reserve,
            ..Default::default()
        };
        let pool = DrivePool::new(&configs, &storage, Duration::from_secs(30)).unwrap();
        (pool, dirs)
    }

    #[test]
    fn test_new_creates_tier_folders() {
        let (pool, dirs) = test_pool(0, 1);
        assert_eq!(pool.len(), 1);
        for dir in &dirs {
            assert!(dir.path().join("FastAccess").is_dir());
            assert!(dir.path().join("Archive").is_dir());
        }
    }

    #[test]
    fn test_select_drive_round_robin() {
        let (pool, _dirs) = test_pool(0, 3);
        let first = pool.select_drive(10).unwrap();
        let second = pool.select_drive(10).unwrap();
        // With zero reserve every pair qualifies, so successive calls must
        // advance to a different pair.
        assert_ne!(first.drive_number, second.drive_number);
    }

    #[test]
    fn test_select_drive_no_capacity() {
        let (pool, _dirs) = test_pool(u64::MAX, 2);
        let err = pool.select_drive(10).unwrap_err();
        assert!(err.is_capacity());
    }

    #[test]
    fn test_select_drive_overflow_guard() {
        let (pool, _dirs) = test_pool(u64::MAX, 1);
        let err = pool.select_drive(u64::MAX).unwrap_err();
        assert!(err.is_capacity());
    }

    #[test]
    fn test_record_write() {
        let (pool, dirs) = test_pool(0, 1);
        let path = dirs[0].path();
        pool.record_write(path, 100);
        pool.record_write(path, 50);
        let usage = pool.snapshot();
        let entry = usage.iter().find(|u| u.path == path).unwrap();
        assert_eq!(entry.used_space, 150);
        assert_eq!(entry.write_count, 2);
    }

    #[test]
    fn test_record_write_negative_delta_still_counts() {
        let (pool, dirs) = test_pool(0, 1);
        let path = dirs[0].path();
        pool.record_write(path, 100);
        pool.record_write(path, -60);
        let usage = pool.snapshot();
        let entry = usage.iter().find(|u| u.path == path).unwrap();
        assert_eq!(entry.used_space, 40);
        assert_eq!(entry.write_count, 2);
    }

    #[test]
    fn test_record_usage_negative_saturates() {
        let (pool, dirs) = test_pool(0, 1);
        let path = dirs[0].path();
        pool.record_usage(path, 100);
        pool.record_usage(path, -250);
        let usage = pool.snapshot();
        let entry = usage.iter().find(|u| u.path == path).unwrap();
        assert_eq!(entry.used_space, 0);
    }

    #[test]
    fn test_refresh_known_and_unknown() {
        let (pool, dirs) = test_pool(0, 1);
        let slot = pool.refresh(dirs[0].path()).unwrap();
        assert!(slot.total_space > 0);
        assert!(pool.refresh(Path::new("/definitely/not/here")).is_err());
    }

    #[test]
    fn test_tier_routing() {
        let (pool, _dirs) = test_pool(0, 1);
        let threshold = StorageConfig::default().fast_access_threshold;
        assert_eq!(pool.tier_for(threshold - 1), Tier::FastAccess);
        assert_eq!(pool.tier_for(threshold), Tier::Archive);
    }

    #[test]
    fn test_concurrent_selection_and_usage() {
        let (pool, dirs) = test_pool(0, 4);
        let pool = std::sync::Arc::new(pool);
        let path = dirs[0].path().to_path_buf();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let path = path.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    pool.select_drive(1).unwrap();
                    pool.record_usage(&path, 1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let usage = pool.snapshot();
        let entry = usage.iter().find(|u| u.path == path).unwrap();
        assert_eq!(entry.used_space, 800);
    }
}
