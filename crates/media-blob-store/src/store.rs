//! The blob store contract

use crate::error::Result;
use crate::types::{Blob, StoreStats};
use async_trait::async_trait;

/// Key to blob storage scoped to a single keyspace.
///
/// Every call is a single atomic operation against the underlying storage;
/// callers need no locking of their own. Absence is a normal outcome, so
/// `get` reports a missing key as `Ok(None)` and `delete`/`clear` succeed
/// when there is nothing to remove.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Look up a blob by key
    async fn get(&self, key: &str) -> Result<Option<Blob>>;

    /// Store a blob, replacing any previous value for the key
    async fn put(&self, key: &str, blob: &Blob) -> Result<()>;

    /// Remove a blob if present
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every blob in this keyspace
    async fn clear(&self) -> Result<()>;

    /// Current store statistics
    async fn stats(&self) -> StoreStats;
}
