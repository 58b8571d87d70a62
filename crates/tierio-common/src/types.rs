//! Core type definitions for Tierio
//!
//! This module defines the fundamental types used throughout the engine:
//! storage keys, tiers, drive roles, and operation kinds.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a storage key in bytes
pub const MAX_KEY_LENGTH: usize = 255;

/// Logical name of a stored item
///
/// Keys are the only caller-supplied path component, so validation here is a
/// security boundary: no separators, no parent references, no NUL bytes.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct StorageKey(String);

impl StorageKey {
    /// Create a new storage key, validating naming rules
    pub fn new(key: impl Into<String>) -> Result<Self, StorageKeyError> {
        let key = key.into();
        Self::validate(&key)?;
        Ok(Self(key))
    }

    /// Get the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(key: &str) -> Result<(), StorageKeyError> {
        if key.is_empty() {
            return Err(StorageKeyError::Empty);
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(StorageKeyError::TooLong);
        }
        if key.contains('/') || key.contains('\\') {
            return Err(StorageKeyError::ContainsSeparator);
        }
        if key == "." || key == ".." {
            return Err(StorageKeyError::PathReference);
        }
        if key.contains('\0') {
            return Err(StorageKeyError::ContainsNul);
        }
        Ok(())
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({:?})", self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when creating a storage key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageKeyError {
    #[error("key must not be empty")]
    Empty,
    #[error("key must be at most {MAX_KEY_LENGTH} bytes")]
    TooLong,
    #[error("key must not contain path separators")]
    ContainsSeparator,
    #[error("key must not be a path reference")]
    PathReference,
    #[error("key must not contain NUL bytes")]
    ContainsNul,
}

/// Storage tier for a payload, derived from its size
///
/// The tier is always computed from the payload size against the configured
/// threshold, never accepted as caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Small payloads on the fast-access path
    FastAccess,
    /// Large payloads in the archive folder
    Archive,
}

impl Tier {
    /// Folder name for this tier under a drive root
    #[must_use]
    pub const fn folder_name(&self) -> &'static str {
        match self {
            Self::FastAccess => "FastAccess",
            Self::Archive => "Archive",
        }
    }

    /// Compute the tier for a payload of `size` bytes
    #[must_use]
    pub const fn for_size(size: u64, threshold: u64) -> Self {
        if size < threshold {
            Self::FastAccess
        } else {
            Self::Archive
        }
    }

    /// The opposite tier
    #[must_use]
    pub const fn other(&self) -> Self {
        match self {
            Self::FastAccess => Self::Archive,
            Self::Archive => Self::FastAccess,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}

/// Role of a drive within a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriveRole {
    /// Serves reads and hosts the authoritative copy
    Primary,
    /// Holds the redundant copy, written but never read
    Mirror,
}

impl fmt::Display for DriveRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Mirror => f.write_str("mirror"),
        }
    }
}

/// Kind of a storage operation, for records and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Read,
    Write,
    Delete,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert!(StorageKey::new("report-2024.pdf").is_ok());
        assert!(StorageKey::new("k1").is_ok());
        assert!(StorageKey::new("a.b.c").is_ok());
    }

    #[test]
    fn test_invalid_keys() {
        assert_eq!(StorageKey::new("").unwrap_err(), StorageKeyError::Empty);
        assert_eq!(
            StorageKey::new("a/b").unwrap_err(),
            StorageKeyError::ContainsSeparator
        );
        assert_eq!(
            StorageKey::new("a\\b").unwrap_err(),
            StorageKeyError::ContainsSeparator
        );
        assert_eq!(
            StorageKey::new("..").unwrap_err(),
            StorageKeyError::PathReference
        );
        assert_eq!(
            StorageKey::new("x".repeat(256)).unwrap_err(),
            StorageKeyError::TooLong
        );
    }

    #[test]
    fn test_tier_for_size() {
        let threshold = 100;
        assert_eq!(Tier::for_size(0, threshold), Tier::FastAccess);
        assert_eq!(Tier::for_size(99, threshold), Tier::FastAccess);
        assert_eq!(Tier::for_size(100, threshold), Tier::Archive);
        assert_eq!(Tier::for_size(101, threshold), Tier::Archive);
    }

    #[test]
    fn test_tier_other() {
        assert_eq!(Tier::FastAccess.other(), Tier::Archive);
        assert_eq!(Tier::Archive.other(), Tier::FastAccess);
    }

    #[test]
    fn test_tier_folder_names() {
        assert_eq!(Tier::FastAccess.folder_name(), "FastAccess");
        assert_eq!(Tier::Archive.folder_name(), "Archive");
    }
}
