//! Common types for the Tierio storage engine
//!
//! This crate defines the error type, configuration structures, and core
//! identifiers shared by every other Tierio crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    CacheConfig, DrivePairConfig, EngineConfig, MonitorConfig, StorageConfig,
    DEFAULT_FAST_ACCESS_THRESHOLD, DEFAULT_RESERVED_FREE_SPACE,
};
pub use error::{Error, Result};
pub use types::{DriveRole, OperationKind, StorageKey, StorageKeyError, Tier};
