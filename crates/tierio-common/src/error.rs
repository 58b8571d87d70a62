//! Error types for Tierio
//!
//! This module defines the common error type used throughout the engine.

use crate::types::StorageKeyError;
use thiserror::Error;

/// Common result type for Tierio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Tierio
#[derive(Debug, Error)]
pub enum Error {
    // Lookup errors
    #[error("item not found: {key}")]
    NotFound { key: String },

    // Capacity errors
    #[error("no drive pair has capacity for {required} bytes (reserve {reserve} bytes)")]
    NoCapacity { required: u64, reserve: u64 },

    #[error("payload too large: {size} bytes exceeds maximum {max} bytes")]
    TooLarge { size: u64, max: u64 },

    // Validation errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(#[from] StorageKeyError),

    // Mirror errors
    #[error("mirror write failed for {key}, primary copy rolled back: {cause}")]
    PartialMirrorFailure { key: String, cause: String },

    // Monitor lifecycle errors
    #[error("monitor is already running")]
    AlreadyRunning,

    #[error("monitor is not running")]
    NotRunning,

    // Cancellation
    #[error("operation cancelled")]
    Cancelled,

    // I/O errors
    #[error("disk I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a not found error
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a capacity error
    #[must_use]
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::NoCapacity { .. } | Self::TooLarge { .. })
    }

    /// Check if this is a cancellation
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if the caller supplied a bad input
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::InvalidKey(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found() {
        assert!(Error::not_found("k1").is_not_found());
        assert!(!Error::Cancelled.is_not_found());
    }

    #[test]
    fn test_error_capacity() {
        assert!(
            Error::NoCapacity {
                required: 10,
                reserve: 50
            }
            .is_capacity()
        );
        assert!(Error::TooLarge { size: 10, max: 5 }.is_capacity());
        assert!(!Error::not_found("k1").is_capacity());
    }

    #[test]
    fn test_error_display() {
        let err = Error::PartialMirrorFailure {
            key: "k1".into(),
            cause: "disk full".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("k1"));
        assert!(msg.contains("rolled back"));
    }

    #[test]
    fn test_invalid_input() {
        assert!(Error::invalid_argument("empty data").is_invalid_input());
        assert!(Error::InvalidKey(StorageKeyError::Empty).is_invalid_input());
        assert!(!Error::Cancelled.is_invalid_input());
    }
}
