//! Operation executor
//!
//! Validates inputs before any I/O, bounds in-flight operations with a
//! counting semaphore, wraps every call in an operation record, and
//! delegates to the mirrored store through the read-through cache.

use crate::metrics::{OperationMetrics, OperationRecord};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tierio_cache::ReadThroughCache;
use tierio_common::{EngineConfig, Error, OperationKind, Result, StorageKey};
use tierio_pool::{DrivePairHandle, DrivePool};
use tierio_store::MirroredStore;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Public entry point for save/load/delete
pub struct OperationExecutor {
    pool: Arc<DrivePool>,
    store: MirroredStore,
    cache: Arc<ReadThroughCache>,
    metrics: Arc<OperationMetrics>,
    permits: Arc<Semaphore>,
    max_payload_size: u64,
    cache_ttl: Duration,
    secure_default: bool,
}

impl OperationExecutor {
    /// Build an executor over explicitly injected components
    #[must_use]
    pub fn new(
        pool: Arc<DrivePool>,
        store: MirroredStore,
        cache: Arc<ReadThroughCache>,
        metrics: Arc<OperationMetrics>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            pool,
            store,
            cache,
            metrics,
            permits: Arc::new(Semaphore::new(config.storage.concurrency_limit)),
            max_payload_size: config.storage.max_payload_size,
            cache_ttl: Duration::from_secs(config.cache.default_ttl_secs),
            secure_default: config.storage.secure_delete_default,
        }
    }

    /// The configured secure-delete default
    #[must_use]
    pub fn secure_default(&self) -> bool {
        self.secure_default
    }

    /// Operation metrics sink
    pub fn metrics(&self) -> &Arc<OperationMetrics> {
        &self.metrics
    }

    /// Store `data` under `key`, mirrored across a drive pair
    pub async fn save(&self, key: &str, data: Bytes, cancel: &CancellationToken) -> Result<()> {
        let begun = Instant::now();
        let started_at = SystemTime::now();
        let size = data.len() as u64;
        let result = self.do_save(key, data, cancel).await;
        self.finish(OperationKind::Write, key, started_at, begun, size, &result);
        result
    }

    /// Load the payload stored under `key`
    pub async fn load(&self, key: &str, cancel: &CancellationToken) -> Result<Bytes> {
        let begun = Instant::now();
        let started_at = SystemTime::now();
        let result = self.do_load(key, cancel).await;
        let bytes = result.as_ref().map(|b| b.len() as u64).unwrap_or(0);
        self.finish(OperationKind::Read, key, started_at, begun, bytes, &result);
        result
    }

    /// Remove `key` from every pair that holds it
    pub async fn delete(&self, key: &str, secure: bool, cancel: &CancellationToken) -> Result<()> {
        let begun = Instant::now();
        let started_at = SystemTime::now();
        let result = self.do_delete(key, secure, cancel).await;
        self.finish(OperationKind::Delete, key, started_at, begun, 0, &result);
        result
    }

    async fn do_save(&self, key: &str, data: Bytes, cancel: &CancellationToken) -> Result<()> {
        let key = StorageKey::new(key)?;
        if data.is_empty() {
            return Err(Error::invalid_argument("payload must not be empty"));
        }
        let size = data.len() as u64;
        if size > self.max_payload_size {
            return Err(Error::TooLarge {
                size,
                max: self.max_payload_size,
            });
        }

        let _permit = self.acquire(cancel).await?;

        // An overwrite stays on the pair that already holds the key, so the
        // stale-tier cleanup happens on the right drives and the key never
        // ends up on two pairs.
        let pair = match self.find_pair(&key).await? {
            Some(pair) => pair,
            None => self.pool.select_drive(size)?,
        };

        self.store.write(&pair, &key, data.clone(), cancel).await?;
        self.cache.set(key.as_str(), data, self.cache_ttl)?;
        Ok(())
    }

    async fn do_load(&self, key: &str, cancel: &CancellationToken) -> Result<Bytes> {
        let key = StorageKey::new(key)?;
        self.cache
            .get_or_set(key.as_str(), self.cache_ttl, || async {
                let _permit = self.acquire(cancel).await?;
                for pair in self.pool.pairs() {
                    match self.store.read(&pair, &key).await {
                        Ok(data) => return Ok(data),
                        Err(e) if e.is_not_found() => {}
                        Err(e) => return Err(e),
                    }
                }
                Err(Error::not_found(key.as_str()))
            })
            .await
    }

    async fn do_delete(&self, key: &str, secure: bool, cancel: &CancellationToken) -> Result<()> {
        let key = StorageKey::new(key)?;
        let _permit = self.acquire(cancel).await?;

        // Invalidate before touching the disks so no stale hit survives
        self.cache.remove(key.as_str())?;

        let mut found = false;
        for pair in self.pool.pairs() {
            match self.store.delete(&pair, &key, secure, cancel).await {
                Ok(_) => found = true,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        if !found {
            return Err(Error::not_found(key.as_str()));
        }
        Ok(())
    }

    /// Wait for a semaphore slot, honouring cancellation
    ///
    /// The permit is a RAII guard, so every exit path releases it.
    async fn acquire(&self, cancel: &CancellationToken) -> Result<SemaphorePermit<'_>> {
        tokio::select! {
            () = cancel.cancelled() => Err(Error::Cancelled),
            permit = self.permits.acquire() => {
                permit.map_err(|_| Error::storage("operation semaphore closed"))
            }
        }
    }

    async fn find_pair(&self, key: &StorageKey) -> Result<Option<DrivePairHandle>> {
        for pair in self.pool.pairs() {
            if self.store.locate(&pair, key).await?.is_some() {
                return Ok(Some(pair));
            }
        }
        Ok(None)
    }

    fn finish<T>(
        &self,
        kind: OperationKind,
        key: &str,
        started_at: SystemTime,
        begun: Instant,
        bytes: u64,
        result: &Result<T>,
    ) {
        let duration = begun.elapsed();
        let record = OperationRecord {
            id: uuid::Uuid::new_v4(),
            kind,
            started_at,
            finished_at: SystemTime::now(),
            duration,
            success: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
            bytes: if result.is_ok() { bytes } else { 0 },
        };

        match result {
            Ok(_) => info!(
                operation = %record.id,
                kind = %kind,
                key,
                bytes = record.bytes,
                duration_ms = duration.as_millis() as u64,
                "operation complete"
            ),
            Err(e) => warn!(
                operation = %record.id,
                kind = %kind,
                key,
                error = %e,
                duration_ms = duration.as_millis() as u64,
                "operation failed"
            ),
        }

        self.metrics.record(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};
    use tierio_common::{CacheConfig, DrivePairConfig, MonitorConfig, StorageConfig, Tier};
    use tierio_store::layout;

    fn test_executor(threshold: u64) -> (OperationExecutor, Vec<TempDir>) {
        let primary = tempdir().unwrap();
        let mirror = tempdir().unwrap();
        let config = EngineConfig {
            drives: vec![DrivePairConfig {
                drive_number: 1,
                primary_path: primary.path().to_path_buf(),
                mirror_path: mirror.path().to_path_buf(),
            }],
            storage: StorageConfig {
                fast_access_threshold: threshold,
                reserved_free_space: 0,
                max_payload_size: 1024 * 1024,
                ..Default::default()
            },
            cache: CacheConfig::default(),
            monitor: MonitorConfig::default(),
        };

        let pool = Arc::new(
            DrivePool::new(&config.drives, &config.storage, Duration::from_secs(30)).unwrap(),
        );
        let store = MirroredStore::new(pool.clone());
        let cache = Arc::new(ReadThroughCache::new(
            config.cache.max_bytes,
            config.cache.max_entries,
        ));
        let metrics = Arc::new(OperationMetrics::new(Duration::from_secs(900)));
        let executor = OperationExecutor::new(pool, store, cache, metrics, &config);
        (executor, vec![primary, mirror])
    }

    #[tokio::test]
    async fn test_save_load_delete_round_trip() {
        let (executor, _dirs) = test_executor(64);
        let cancel = CancellationToken::new();
        let data = Bytes::from(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);

        executor.save("k1", data.clone(), &cancel).await.unwrap();
        let loaded = executor.load("k1", &cancel).await.unwrap();
        assert_eq!(loaded, data);

        executor.delete("k1", false, &cancel).await.unwrap();
        let err = executor.load("k1", &cancel).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_validation_rejected_before_io() {
        let (executor, dirs) = test_executor(64);
        let cancel = CancellationToken::new();

        let err = executor
            .save("", Bytes::from_static(b"x"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());

        let err = executor.save("k1", Bytes::new(), &cancel).await.unwrap_err();
        assert!(err.is_invalid_input());

        let err = executor
            .save("big", Bytes::from(vec![0u8; 2 * 1024 * 1024]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TooLarge { .. }));

        // Nothing must have reached the disks
        for dir in &dirs {
            for tier in [Tier::FastAccess, Tier::Archive] {
                let entries: Vec<_> = std::fs::read_dir(dir.path().join(tier.folder_name()))
                    .unwrap()
                    .collect();
                assert!(entries.is_empty());
            }
        }
    }

    #[tokio::test]
    async fn test_load_served_from_cache_after_save() {
        let (executor, dirs) = test_executor(64);
        let cancel = CancellationToken::new();
        let data = Bytes::from_static(b"cached payload");

        executor.save("hot", data.clone(), &cancel).await.unwrap();

        // Remove the files behind the cache's back; the cached copy still
        // serves the read.
        let key = StorageKey::new("hot").unwrap();
        for dir in &dirs {
            let path = layout::object_path(dir.path(), Tier::FastAccess, &key);
            let _ = std::fs::remove_file(path);
        }

        let loaded = executor.load("hot", &cancel).await.unwrap();
        assert_eq!(loaded, data);
    }

    #[tokio::test]
    async fn test_delete_invalidates_cache() {
        let (executor, _dirs) = test_executor(64);
        let cancel = CancellationToken::new();

        executor
            .save("gone", Bytes::from_static(b"payload"), &cancel)
            .await
            .unwrap();
        executor.delete("gone", false, &cancel).await.unwrap();

        let err = executor.load("gone", &cancel).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_missing_key() {
        let (executor, _dirs) = test_executor(64);
        let cancel = CancellationToken::new();
        let err = executor.delete("ghost", false, &cancel).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_cancelled_operation_skipped() {
        let (executor, _dirs) = test_executor(64);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = executor
            .save("never", Bytes::from_static(b"data"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_operations_are_recorded() {
        let (executor, _dirs) = test_executor(64);
        let cancel = CancellationToken::new();

        executor
            .save("k1", Bytes::from_static(b"payload"), &cancel)
            .await
            .unwrap();
        executor.load("k1", &cancel).await.unwrap();
        let _ = executor.load("missing", &cancel).await;

        let totals = executor.metrics().totals();
        assert_eq!(totals.total_ops, 3);
        assert_eq!(totals.failed_ops, 1);
        assert_eq!(totals.bytes_written, 7);
        assert_eq!(totals.bytes_read, 7);
    }

    #[tokio::test]
    async fn test_overwrite_migrates_tier() {
        let (executor, dirs) = test_executor(64);
        let cancel = CancellationToken::new();
        let key = StorageKey::new("grower").unwrap();

        executor
            .save("grower", Bytes::from(vec![0u8; 10]), &cancel)
            .await
            .unwrap();
        executor
            .save("grower", Bytes::from(vec![0u8; 128]), &cancel)
            .await
            .unwrap();

        for dir in &dirs {
            assert!(!layout::object_path(dir.path(), Tier::FastAccess, &key).exists());
            assert!(layout::object_path(dir.path(), Tier::Archive, &key).exists());
        }
    }

    #[tokio::test]
    async fn test_capacity_exhaustion_creates_nothing() {
        let primary = tempdir().unwrap();
        let mirror = tempdir().unwrap();
        let config = EngineConfig {
            drives: vec![DrivePairConfig {
                drive_number: 1,
                primary_path: primary.path().to_path_buf(),
                mirror_path: mirror.path().to_path_buf(),
            }],
            storage: StorageConfig {
                // No drive can satisfy size + reserve
                reserved_free_space: u64::MAX,
                ..Default::default()
            },
            cache: CacheConfig::default(),
            monitor: MonitorConfig::default(),
        };
        let pool = Arc::new(
            DrivePool::new(&config.drives, &config.storage, Duration::from_secs(30)).unwrap(),
        );
        let store = MirroredStore::new(pool.clone());
        let cache = Arc::new(ReadThroughCache::new(
            config.cache.max_bytes,
            config.cache.max_entries,
        ));
        let metrics = Arc::new(OperationMetrics::new(Duration::from_secs(900)));
        let executor = OperationExecutor::new(pool, store, cache, metrics, &config);

        let cancel = CancellationToken::new();
        let err = executor
            .save("nope", Bytes::from_static(b"payload"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoCapacity { .. }));

        for dir in [primary.path(), mirror.path()] {
            for tier in [Tier::FastAccess, Tier::Archive] {
                let entries: Vec<_> = std::fs::read_dir(dir.join(tier.folder_name()))
                    .unwrap()
                    .collect();
                assert!(entries.is_empty());
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_saves_within_ceiling() {
        let (executor, _dirs) = test_executor(64);
        let executor = Arc::new(executor);
        let cancel = CancellationToken::new();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let executor = executor.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                let key = format!("key-{i}");
                let data = Bytes::from(vec![i as u8 + 1; 32]);
                executor.save(&key, data.clone(), &cancel).await.unwrap();
                let loaded = executor.load(&key, &cancel).await.unwrap();
                assert_eq!(loaded, data);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(executor.metrics().totals().total_ops, 40);
        assert_eq!(executor.metrics().totals().failed_ops, 0);
    }
}
