//! Engine assembly
//!
//! Builds the pool, store, cache, executor, and monitor from one
//! configuration value. Every component is an explicitly constructed,
//! injected instance whose lifetime is tied to the engine.

use crate::executor::OperationExecutor;
use crate::metrics::OperationMetrics;
use std::sync::Arc;
use std::time::Duration;
use tierio_cache::ReadThroughCache;
use tierio_common::{EngineConfig, Result};
use tierio_monitor::{HealthMonitor, HealthThresholds};
use tierio_pool::DrivePool;
use tierio_store::MirroredStore;
use tracing::info;

/// A fully wired Tierio storage engine
pub struct StorageEngine {
    config: EngineConfig,
    pool: Arc<DrivePool>,
    executor: Arc<OperationExecutor>,
    monitor: Arc<HealthMonitor>,
    metrics: Arc<OperationMetrics>,
}

impl StorageEngine {
    /// Validate `config` and wire up all components
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let sampling_interval = Duration::from_secs(config.monitor.sampling_interval_secs);
        let pool = Arc::new(DrivePool::new(
            &config.drives,
            &config.storage,
            sampling_interval,
        )?);
        let store = MirroredStore::new(pool.clone());
        let cache = Arc::new(ReadThroughCache::new(
            config.cache.max_bytes,
            config.cache.max_entries,
        ));
        let metrics = Arc::new(OperationMetrics::new(Duration::from_secs(
            config.storage.metrics_window_secs,
        )));
        let executor = Arc::new(OperationExecutor::new(
            pool.clone(),
            store,
            cache,
            metrics.clone(),
            &config,
        ));
        let monitor = Arc::new(HealthMonitor::new(
            pool.clone(),
            HealthThresholds {
                warning_pct: config.monitor.warning_pct,
                critical_pct: config.monitor.critical_pct,
            },
        ));

        info!(
            pairs = config.drives.len(),
            concurrency = config.storage.concurrency_limit,
            "storage engine assembled"
        );

        Ok(Self {
            config,
            pool,
            executor,
            monitor,
            metrics,
        })
    }

    /// Launch the background health monitor
    pub fn start_monitor(&self) -> Result<()> {
        self.monitor.start(
            Duration::from_secs(self.config.monitor.sampling_interval_secs),
            Duration::from_secs(self.config.monitor.retention_period_secs),
        )
    }

    /// Stop the monitor and release background tasks
    pub async fn shutdown(&self) {
        self.monitor.stop().await;
    }

    pub fn executor(&self) -> &Arc<OperationExecutor> {
        &self.executor
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn pool(&self) -> &Arc<DrivePool> {
        &self.pool
    }

    pub fn metrics(&self) -> &Arc<OperationMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;
    use tierio_common::{DrivePairConfig, StorageConfig};
    use tokio_util::sync::CancellationToken;

    fn test_config() -> (EngineConfig, Vec<tempfile::TempDir>) {
        let primary = tempdir().unwrap();
        let mirror = tempdir().unwrap();
        let config = EngineConfig {
            drives: vec![DrivePairConfig {
                drive_number: 1,
                primary_path: primary.path().to_path_buf(),
                mirror_path: mirror.path().to_path_buf(),
            }],
            storage: StorageConfig {
                reserved_free_space: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        (config, vec![primary, mirror])
    }

    #[tokio::test]
    async fn test_engine_round_trip() {
        let (config, _dirs) = test_config();
        let engine = StorageEngine::new(config).unwrap();
        let cancel = CancellationToken::new();

        engine
            .executor()
            .save("k1", Bytes::from_static(b"hello"), &cancel)
            .await
            .unwrap();
        let loaded = engine.executor().load("k1", &cancel).await.unwrap();
        assert_eq!(loaded, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_engine_rejects_bad_config() {
        let config = EngineConfig::default();
        assert!(StorageEngine::new(config).is_err());
    }

    #[tokio::test]
    async fn test_engine_monitor_lifecycle() {
        let (config, dirs) = test_config();
        let engine = StorageEngine::new(config).unwrap();

        engine.start_monitor().unwrap();
        assert!(engine.start_monitor().is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(engine.monitor().latest(dirs[0].path()).is_some());

        engine.shutdown().await;
        assert!(!engine.monitor().is_running());
    }
}
