//! Revocable media handles and the in-memory table that owns them

use crate::types::CacheKey;
use bytes::Bytes;
use media_blob_store::Blob;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A cheap, revocable reference to a blob's bytes for a display surface.
///
/// Clones share one underlying slot: revoking any clone leaves every clone
/// dangling, after which [`Handle::bytes`] returns `None` and the surface
/// should render an empty or broken state. Each holder releases its clone by
/// dropping it; the bytes are freed once the handle is revoked or every
/// clone is gone.
#[derive(Clone)]
pub struct Handle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: u64,
    content_type: String,
    size: usize,
    data: Mutex<Option<Bytes>>,
}

impl Handle {
    fn new(id: u64, blob: &Blob) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                content_type: blob.content_type().to_string(),
                size: blob.len(),
                data: Mutex::new(Some(blob.data().clone())),
            }),
        }
    }

    /// Identifier unique among handles issued by one table
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn content_type(&self) -> &str {
        &self.inner.content_type
    }

    /// Size in bytes of the referenced content, retained after revocation
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// The referenced bytes, or `None` once revoked
    pub fn bytes(&self) -> Option<Bytes> {
        self.slot().clone()
    }

    pub fn is_revoked(&self) -> bool {
        self.slot().is_none()
    }

    /// Release the referenced bytes. Returns `true` only for the call that
    /// actually revoked; later calls are no-ops.
    pub fn revoke(&self) -> bool {
        self.slot().take().is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Bytes>> {
        self.inner
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Handle {}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.inner.id)
            .field("content_type", &self.inner.content_type)
            .field("size", &self.inner.size)
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

/// Statistics about issued handles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandleStats {
    pub issued: u64,
    pub revoked: u64,
    pub live: u64,
}

/// In-memory map from cache key to the currently issued handle.
///
/// All operations are synchronous.
pub struct HandleTable {
    entries: Cache<CacheKey, Handle>,
    next_id: AtomicU64,
    issued: AtomicU64,
    revoked: AtomicU64,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().build(),
            next_id: AtomicU64::new(1),
            issued: AtomicU64::new(0),
            revoked: AtomicU64::new(0),
        }
    }

    /// Derive a fresh handle from a blob without registering it
    pub fn issue(&self, blob: &Blob) -> Handle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.issued.fetch_add(1, Ordering::Relaxed);
        Handle::new(id, blob)
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<Handle> {
        self.entries.get(key)
    }

    /// Make `handle` the live handle for `key`.
    ///
    /// A handle it replaces is left intact: a concurrent caller may still be
    /// displaying it.
    pub fn register(&self, key: CacheKey, handle: Handle) {
        self.entries.insert(key, handle);
    }

    /// Revoke and remove the handle for `key`. Returns whether an entry was
    /// present.
    pub fn revoke(&self, key: &CacheKey) -> bool {
        match self.entries.remove(key) {
            Some(handle) => {
                if handle.revoke() {
                    self.revoked.fetch_add(1, Ordering::Relaxed);
                }
                true
            }
            None => false,
        }
    }

    /// Revoke every entry and empty the table. Returns the number removed.
    pub fn revoke_all(&self) -> usize {
        let keys: Vec<Arc<CacheKey>> = self.entries.iter().map(|(key, _)| key).collect();
        keys.iter().filter(|key| self.revoke(key)).count()
    }

    pub fn stats(&self) -> HandleStats {
        self.entries.run_pending_tasks();
        HandleStats {
            issued: self.issued.load(Ordering::Relaxed),
            revoked: self.revoked.load(Ordering::Relaxed),
            live: self.entries.entry_count(),
        }
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
