//! Storage backend capability trait
//!
//! A single seam for callers that should not depend on the concrete
//! executor, e.g. application shells and test doubles.

use crate::executor::OperationExecutor;
use async_trait::async_trait;
use bytes::Bytes;
use tierio_common::Result;
use tokio_util::sync::CancellationToken;

/// Write/read/delete capability over mirrored tiered storage
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store `data` under `key`
    async fn write(&self, key: &str, data: Bytes, cancel: &CancellationToken) -> Result<()>;

    /// Load the payload stored under `key`
    async fn read(&self, key: &str, cancel: &CancellationToken) -> Result<Bytes>;

    /// Remove `key`, optionally zero-overwriting the contents first
    async fn delete(&self, key: &str, secure: bool, cancel: &CancellationToken) -> Result<()>;
}

#[async_trait]
impl StorageBackend for OperationExecutor {
    async fn write(&self, key: &str, data: Bytes, cancel: &CancellationToken) -> Result<()> {
        self.save(key, data, cancel).await
    }

    async fn read(&self, key: &str, cancel: &CancellationToken) -> Result<Bytes> {
        self.load(key, cancel).await
    }

    async fn delete(&self, key: &str, secure: bool, cancel: &CancellationToken) -> Result<()> {
        OperationExecutor::delete(self, key, secure, cancel).await
    }
}
