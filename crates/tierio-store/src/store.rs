//! Coordinated write/read/delete across a drive pair
//!
//! A write stages into a temp file, syncs, verifies the staged bytes, then
//! renames over the final path. The rename is the only step observable as
//! "item now exists". Both copies must land; a mirror failure (or a
//! cancellation between the two copies) removes the primary copy before the
//! error returns, so callers never see a half-mirrored item.

use crate::layout;
use bytes::Bytes;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tierio_common::{Error, Result, StorageKey, Tier};
use tierio_pool::{DrivePairHandle, DrivePool};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Chunk size for the secure-delete zero-overwrite loop
const WIPE_CHUNK: usize = 1024 * 1024;

/// Mirrored store over a drive pool
pub struct MirroredStore {
    pool: Arc<DrivePool>,
}

impl MirroredStore {
    /// Create a store backed by `pool`
    #[must_use]
    pub fn new(pool: Arc<DrivePool>) -> Self {
        Self { pool }
    }

    /// Write `data` under `key` on both drives of `pair`
    ///
    /// The tier is recomputed from the payload size on every write, so a key
    /// can migrate between tiers across successive writes; the old tier's
    /// copy is removed as part of the same operation. Returns the tier the
    /// payload landed in.
    pub async fn write(
        &self,
        pair: &DrivePairHandle,
        key: &StorageKey,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> Result<Tier> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let size = data.len() as u64;
        let tier = self.pool.tier_for(size);
        let checksum = crc32c::crc32c(&data);

        let prior_len = {
            let root = pair.primary_root.clone();
            let key = key.clone();
            run_blocking(move || Ok(locate_on(&root, &key).map(|(_, len)| len))).await?
        }
        .unwrap_or(0);

        // Primary copy first; order is immaterial to correctness
        {
            let root = pair.primary_root.clone();
            let key = key.clone();
            let data = data.clone();
            run_blocking(move || write_atomic(&root, tier, &key, &data, checksum)).await?;
        }

        // Cancellation between the copies takes the same path as a mirror
        // failure: the primary must not stay visible.
        if cancel.is_cancelled() {
            self.rollback_primary(pair, tier, key).await;
            return Err(Error::Cancelled);
        }

        {
            let root = pair.mirror_root.clone();
            let key_owned = key.clone();
            let data = data.clone();
            if let Err(e) =
                run_blocking(move || write_atomic(&root, tier, &key_owned, &data, checksum)).await
            {
                self.rollback_primary(pair, tier, key).await;
                return Err(Error::PartialMirrorFailure {
                    key: key.to_string(),
                    cause: e.to_string(),
                });
            }
        }

        // Remove a stale copy left in the opposite tier by an earlier write
        {
            let primary = pair.primary_root.clone();
            let mirror = pair.mirror_root.clone();
            let key = key.clone();
            run_blocking(move || {
                for root in [&primary, &mirror] {
                    remove_if_exists(&layout::object_path(root, tier.other(), &key))?;
                }
                Ok(())
            })
            .await?;
        }

        self.pool
            .record_write(&pair.primary_root, size as i64 - prior_len as i64);

        debug!(
            key = %key,
            drive_number = pair.drive_number,
            %tier,
            size,
            "mirrored write complete"
        );
        Ok(tier)
    }

    /// Read `key` from the primary drive of `pair`
    ///
    /// Checks the FastAccess folder first, then Archive. The mirror exists
    /// purely for recovery and is never consulted.
    pub async fn read(&self, pair: &DrivePairHandle, key: &StorageKey) -> Result<Bytes> {
        let root = pair.primary_root.clone();
        let key = key.clone();
        run_blocking(move || {
            for tier in [Tier::FastAccess, Tier::Archive] {
                let path = layout::object_path(&root, tier, &key);
                match fs::read(&path) {
                    Ok(data) => return Ok(Bytes::from(data)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Err(Error::not_found(key.as_str()))
        })
        .await
    }

    /// Find `key` on the primary drive of `pair`, returning its tier and size
    pub async fn locate(
        &self,
        pair: &DrivePairHandle,
        key: &StorageKey,
    ) -> Result<Option<(Tier, u64)>> {
        let root = pair.primary_root.clone();
        let key = key.clone();
        run_blocking(move || Ok(locate_on(&root, &key))).await
    }

    /// Remove `key` from both drives of `pair`
    ///
    /// With `secure` set, file contents are zero-overwritten in chunks before
    /// the filesystem delete, and the routine verifies the paths are gone.
    /// Returns the bytes freed on the primary drive.
    pub async fn delete(
        &self,
        pair: &DrivePairHandle,
        key: &StorageKey,
        secure: bool,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let primary = pair.primary_root.clone();
        let mirror = pair.mirror_root.clone();
        let key_owned = key.clone();
        let cancel = cancel.clone();
        let freed = run_blocking(move || {
            let mut found = false;
            let mut primary_freed = 0u64;
            for root in [&primary, &mirror] {
                for tier in [Tier::FastAccess, Tier::Archive] {
                    let path = layout::object_path(root, tier, &key_owned);
                    let Ok(meta) = fs::metadata(&path) else {
                        continue;
                    };
                    found = true;
                    if root == &primary {
                        primary_freed += meta.len();
                    }
                    if secure {
                        secure_wipe(&path, &cancel)?;
                    } else {
                        fs::remove_file(&path)?;
                    }
                }
            }
            if !found {
                return Err(Error::not_found(key_owned.as_str()));
            }
            Ok(primary_freed)
        })
        .await?;

        self.pool
            .record_usage(&pair.primary_root, -(freed.min(i64::MAX as u64) as i64));

        debug!(key = %key, drive_number = pair.drive_number, secure, freed, "delete complete");
        Ok(freed)
    }

    async fn rollback_primary(&self, pair: &DrivePairHandle, tier: Tier, key: &StorageKey) {
        let root = pair.primary_root.clone();
        let key_owned = key.clone();
        let result = run_blocking(move || {
            let target = layout::object_path(&root, tier, &key_owned);
            remove_if_exists(&layout::temp_path(&target))?;
            remove_if_exists(&target)?;
            Ok(())
        })
        .await;
        if let Err(e) = result {
            warn!(key = %key, error = %e, "rollback of primary copy failed");
        }
    }
}

/// Run a blocking filesystem closure off the async executor
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::storage(format!("blocking task failed: {e}")))?
}

/// Find a key in either tier folder of one drive root
fn locate_on(root: &Path, key: &StorageKey) -> Option<(Tier, u64)> {
    for tier in [Tier::FastAccess, Tier::Archive] {
        if let Ok(meta) = fs::metadata(layout::object_path(root, tier, key)) {
            return Some((tier, meta.len()));
        }
    }
    None
}

/// Stage, sync, verify, then atomically rename into place
fn write_atomic(root: &Path, tier: Tier, key: &StorageKey, data: &[u8], checksum: u32) -> Result<()> {
    let target = layout::object_path(root, tier, key);
    let tmp = layout::temp_path(&target);

    let staged = (|| -> Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        let written = fs::read(&tmp)?;
        let actual = crc32c::crc32c(&written);
        if actual != checksum {
            return Err(Error::storage(format!(
                "staged copy of {} is corrupt: expected crc {checksum:08x}, got {actual:08x}",
                target.display()
            )));
        }

        fs::rename(&tmp, &target)?;
        Ok(())
    })();

    if staged.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    staged
}

/// Remove a file, treating absence as success
fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Zero-overwrite a file's contents, then remove it and verify it is gone
fn secure_wipe(path: &Path, cancel: &CancellationToken) -> Result<()> {
    let len = fs::metadata(path)?.len();
    let mut file = OpenOptions::new().write(true).open(path)?;
    let zeros = vec![0u8; WIPE_CHUNK];
    let mut remaining = len;
    while remaining > 0 {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let n = remaining.min(WIPE_CHUNK as u64) as usize;
        file.write_all(&zeros[..n])?;
        remaining -= n as u64;
    }
    file.sync_all()?;
    drop(file);

    fs::remove_file(path)?;
    if path.exists() {
        return Err(Error::storage(format!(
            "secure delete left {} behind",
            path.display()
        )));
    }
    Ok(())
}
