//! Configuration types for Tierio
//!
//! This module defines the configuration surface consumed at engine startup.
//! All sizes are byte counts; durations use explicit `*_secs`/`*_ms` fields.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Default size threshold separating FastAccess from Archive (100 MiB)
pub const DEFAULT_FAST_ACCESS_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Default minimum free space kept on every drive (50 GiB)
pub const DEFAULT_RESERVED_FREE_SPACE: u64 = 50 * 1024 * 1024 * 1024;

/// Root configuration for a Tierio engine
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Drive pairs backing the pool
    pub drives: Vec<DrivePairConfig>,
    /// Storage behaviour
    pub storage: StorageConfig,
    /// Read-through cache behaviour
    pub cache: CacheConfig,
    /// Health monitor behaviour
    pub monitor: MonitorConfig,
}

impl EngineConfig {
    /// Check the configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.drives.is_empty() {
            return Err(Error::configuration("at least one drive pair is required"));
        }
        let mut numbers = HashSet::new();
        for pair in &self.drives {
            if !numbers.insert(pair.drive_number) {
                return Err(Error::configuration(format!(
                    "duplicate drive number: {}",
                    pair.drive_number
                )));
            }
            if pair.primary_path == pair.mirror_path {
                return Err(Error::configuration(format!(
                    "drive {} has identical primary and mirror paths",
                    pair.drive_number
                )));
            }
        }
        if self.storage.fast_access_threshold == 0 {
            return Err(Error::configuration("fast_access_threshold must be non-zero"));
        }
        if self.storage.max_payload_size == 0 {
            return Err(Error::configuration("max_payload_size must be non-zero"));
        }
        if self.storage.concurrency_limit == 0 {
            return Err(Error::configuration("concurrency_limit must be non-zero"));
        }
        if self.monitor.warning_pct >= self.monitor.critical_pct {
            return Err(Error::configuration(
                "warning_pct must be below critical_pct",
            ));
        }
        Ok(())
    }
}

/// A primary/mirror drive pair
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DrivePairConfig {
    /// Identifier shared by both drives of the pair
    pub drive_number: u32,
    /// Root directory of the primary drive
    pub primary_path: PathBuf,
    /// Root directory of the mirror drive
    pub mirror_path: PathBuf,
}

/// Storage behaviour configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Payloads below this size go to FastAccess, at or above to Archive
    pub fast_access_threshold: u64,
    /// Free space a drive must keep after hosting a payload
    pub reserved_free_space: u64,
    /// Maximum accepted payload size (default: 2 GiB)
    pub max_payload_size: u64,
    /// Maximum simultaneous in-flight operations
    pub concurrency_limit: usize,
    /// Overwrite file contents with zeros before deleting by default
    pub secure_delete_default: bool,
    /// How long finished operation records are retained
    pub metrics_window_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            fast_access_threshold: DEFAULT_FAST_ACCESS_THRESHOLD,
            reserved_free_space: DEFAULT_RESERVED_FREE_SPACE,
            max_payload_size: 2 * 1024 * 1024 * 1024, // 2 GiB
            concurrency_limit: 5,
            secure_delete_default: false,
            metrics_window_secs: 15 * 60,
        }
    }
}

/// Read-through cache configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default time-to-live for cached values
    pub default_ttl_secs: u64,
    /// Soft cap on total cached bytes
    pub max_bytes: u64,
    /// Soft cap on cached entry count
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            max_bytes: 100 * 1024 * 1024, // 100 MiB
            max_entries: 1000,
        }
    }
}

/// Health monitor configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between sampling passes
    pub sampling_interval_secs: u64,
    /// How long snapshots are retained per drive
    pub retention_period_secs: u64,
    /// Usage percentage at which a drive is flagged Warning
    pub warning_pct: f64,
    /// Usage percentage at which a drive is flagged Critical
    pub critical_pct: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sampling_interval_secs: 30,
            retention_period_secs: 24 * 60 * 60,
            warning_pct: 80.0,
            critical_pct: 90.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(n: u32) -> DrivePairConfig {
        DrivePairConfig {
            drive_number: n,
            primary_path: PathBuf::from(format!("/mnt/d{n}")),
            mirror_path: PathBuf::from(format!("/mnt/m{n}")),
        }
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(
            config.storage.fast_access_threshold,
            DEFAULT_FAST_ACCESS_THRESHOLD
        );
        assert_eq!(config.storage.concurrency_limit, 5);
        assert_eq!(config.cache.max_entries, 1000);
        assert!((config.monitor.warning_pct - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_requires_drives() {
        let config = EngineConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_numbers() {
        let config = EngineConfig {
            drives: vec![pair(1), pair(1)],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_self_mirror() {
        let mut bad = pair(1);
        bad.mirror_path = bad.primary_path.clone();
        let config = EngineConfig {
            drives: vec![bad],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ok() {
        let config = EngineConfig {
            drives: vec![pair(1), pair(2)],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = EngineConfig {
            drives: vec![pair(1)],
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.drives.len(), 1);
        assert_eq!(back.storage.concurrency_limit, 5);
    }
}
