//! The media cache service: memory tier, persistent tier, origin fallback

use crate::config::CacheConfig;
use crate::error::{OriginError, Result};
use crate::handle::{Handle, HandleTable};
use crate::origin::{HttpMediaOrigin, MediaOrigin};
use crate::types::{CacheKey, CacheStats, MediaKey, Variant};
use media_blob_store::{Blob, BlobStore, FileBlobStore, StoreError, StoreStats};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Blob store operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    Get,
    Put,
    Delete,
    Clear,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreOperation::Get => "get",
            StoreOperation::Put => "put",
            StoreOperation::Delete => "delete",
            StoreOperation::Clear => "clear",
        })
    }
}

/// A persistent-tier failure absorbed by the cache
#[derive(Debug)]
pub struct StoreFailure {
    pub operation: StoreOperation,
    /// Storage key involved, absent for `Clear`
    pub key: Option<String>,
    pub error: StoreError,
}

/// Callback receiving absorbed persistent-tier failures
pub type StoreErrorObserver = Arc<dyn Fn(&StoreFailure) + Send + Sync>;

/// Logs, counts and forwards store failures; shared with background writes
#[derive(Default)]
struct FailureReporter {
    failures: AtomicU64,
    observer: RwLock<Option<StoreErrorObserver>>,
}

impl FailureReporter {
    fn set_observer(&self, observer: StoreErrorObserver) {
        *self.observer.write().unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    fn report(&self, failure: StoreFailure) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        warn!(
            operation = %failure.operation,
            key = failure.key.as_deref().unwrap_or("*"),
            error = %failure.error,
            "Blob store operation failed, continuing without persistence"
        );
        let observer = self
            .observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            observer(&failure);
        }
    }
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    store_hits: AtomicU64,
    origin_fetches: AtomicU64,
    origin_failures: AtomicU64,
}

/// Two-tier cache of media handles.
///
/// Construct one per application and share it (typically behind an `Arc`).
/// Lookups go to the in-memory handle table, then the persistent blob store,
/// then the origin. Only origin failures reach the caller; persistence is
/// best-effort.
///
/// Concurrent resolves of the same key are not deduplicated: each may fetch
/// independently and the last registration wins. Content is immutable, so
/// the duplicates are identical.
pub struct MediaCache {
    handles: HandleTable,
    store: Arc<dyn BlobStore>,
    origin: Arc<dyn MediaOrigin>,
    reporter: Arc<FailureReporter>,
    counters: Counters,
    /// Background blob writes not yet known to be finished, by storage key
    pending_writes: Mutex<HashMap<String, Vec<JoinHandle<()>>>>,
}

impl MediaCache {
    pub fn new(store: Arc<dyn BlobStore>, origin: Arc<dyn MediaOrigin>) -> Self {
        Self {
            handles: HandleTable::new(),
            store,
            origin,
            reporter: Arc::new(FailureReporter::default()),
            counters: Counters::default(),
            pending_writes: Mutex::new(HashMap::new()),
        }
    }

    /// Build a cache over a file-backed store and an HTTP origin and prepare
    /// the store directory
    pub async fn from_config(config: &CacheConfig) -> Result<Self> {
        let mut store = FileBlobStore::new(&config.cache_dir);
        if let Some(ttl) = config.cache_ttl() {
            store = store.with_ttl(ttl);
        }
        store.init().await?;

        let client = reqwest::Client::builder()
            .timeout(config.origin_timeout())
            .build()
            .map_err(OriginError::from)?;
        let mut origin = HttpMediaOrigin::with_client(client, &config.origin_url)?
            .with_paths(&config.full_path, &config.thumbnail_path);
        if let Some(token) = &config.origin_token {
            origin = origin.with_auth_token(token);
        }

        info!(
            cache_dir = ?config.cache_dir,
            origin_url = %config.origin_url,
            "Media cache initialized"
        );

        Ok(Self::new(Arc::new(store), Arc::new(origin)))
    }

    /// Observe persistent-tier failures that the cache absorbs, including
    /// those of background writes already in flight
    pub fn with_store_error_observer(
        self,
        observer: impl Fn(&StoreFailure) + Send + Sync + 'static,
    ) -> Self {
        self.reporter.set_observer(Arc::new(observer));
        self
    }

    /// Resolve the full image for `key`
    pub async fn resolve(&self, key: &str) -> Result<Handle> {
        self.resolve_variant(key, Variant::Full).await
    }

    /// Resolve the thumbnail for `key`
    pub async fn resolve_thumbnail(&self, key: &str) -> Result<Handle> {
        self.resolve_variant(key, Variant::Thumbnail).await
    }

    /// Resolve a handle for `key` and `variant`, populating both tiers on a
    /// miss. Fails only for an invalid key or when the origin fetch fails;
    /// failures are not cached, so the next call retries the origin.
    pub async fn resolve_variant(&self, key: &str, variant: Variant) -> Result<Handle> {
        let key = CacheKey::new(MediaKey::new(key)?, variant);

        if let Some(handle) = self.handles.lookup(&key) {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(handle);
        }

        let storage_key = key.storage_key();
        match self.store.get(&storage_key).await {
            Ok(Some(blob)) => {
                self.counters.store_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key.key, variant = %variant, "Media served from blob store");
                return Ok(self.register(key, &blob));
            }
            Ok(None) => {}
            Err(error) => self.reporter.report(StoreFailure {
                operation: StoreOperation::Get,
                key: Some(storage_key.clone()),
                error,
            }),
        }

        self.counters.origin_fetches.fetch_add(1, Ordering::Relaxed);
        let blob = match self.origin.fetch(&key.key, variant).await {
            Ok(blob) => blob,
            Err(e) => {
                self.counters.origin_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key.key, variant = %variant, error = %e, "Failed to fetch media");
                return Err(e.into());
            }
        };

        debug!(key = %key.key, variant = %variant, size = blob.len(), "Media fetched from origin");
        let handle = self.register(key, &blob);
        self.persist(storage_key, blob);
        Ok(handle)
    }

    /// Memory-tier lookup of the full image; never performs I/O
    pub fn peek(&self, key: &str) -> Option<Handle> {
        self.peek_variant(key, Variant::Full)
    }

    /// Memory-tier lookup of the thumbnail; never performs I/O
    pub fn peek_thumbnail(&self, key: &str) -> Option<Handle> {
        self.peek_variant(key, Variant::Thumbnail)
    }

    pub fn peek_variant(&self, key: &str, variant: Variant) -> Option<Handle> {
        let key = CacheKey::new(MediaKey::new(key).ok()?, variant);
        self.handles.lookup(&key)
    }

    /// Evict the full image for `key` from both tiers
    pub async fn evict(&self, key: &str) -> Result<()> {
        self.evict_variant(key, Variant::Full).await
    }

    /// Evict the thumbnail for `key` from both tiers
    pub async fn evict_thumbnail(&self, key: &str) -> Result<()> {
        self.evict_variant(key, Variant::Thumbnail).await
    }

    /// Revoke the live handle for `key` and `variant`, then delete its blob.
    /// Background writes of that blob still in flight are awaited first so
    /// they cannot land after the delete. The other variant of the same key
    /// is left untouched.
    pub async fn evict_variant(&self, key: &str, variant: Variant) -> Result<()> {
        let key = CacheKey::new(MediaKey::new(key)?, variant);
        let revoked = self.handles.revoke(&key);

        let storage_key = key.storage_key();
        let pending = self.lock_pending().remove(&storage_key).unwrap_or_default();
        await_writes(pending).await;

        if let Err(error) = self.store.delete(&storage_key).await {
            self.reporter.report(StoreFailure {
                operation: StoreOperation::Delete,
                key: Some(storage_key),
                error,
            });
        }

        debug!(key = %key.key, variant = %variant, revoked, "Evicted media");
        Ok(())
    }

    /// Revoke every live handle, then clear the blob store once the
    /// background writes started so far have landed
    pub async fn evict_all(&self) {
        let revoked = self.handles.revoke_all();
        self.flush().await;

        if let Err(error) = self.store.clear().await {
            self.reporter.report(StoreFailure {
                operation: StoreOperation::Clear,
                key: None,
                error,
            });
        }

        info!(revoked, "Evicted all cached media");
    }

    /// Wait for every background blob write started so far
    pub async fn flush(&self) {
        let pending = std::mem::take(&mut *self.lock_pending());
        await_writes(pending.into_values().flatten()).await;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            store_hits: self.counters.store_hits.load(Ordering::Relaxed),
            origin_fetches: self.counters.origin_fetches.load(Ordering::Relaxed),
            origin_failures: self.counters.origin_failures.load(Ordering::Relaxed),
            store_failures: self.reporter.failures.load(Ordering::Relaxed),
            handles: self.handles.stats(),
        }
    }

    pub async fn store_stats(&self) -> StoreStats {
        self.store.stats().await
    }

    fn register(&self, key: CacheKey, blob: &Blob) -> Handle {
        let handle = self.handles.issue(blob);
        self.handles.register(key, handle.clone());
        handle
    }

    /// Write a blob to the store in the background. The write is detached:
    /// it outlives the cache and its failure only reaches the reporter.
    /// Eviction of the same storage key waits for it.
    fn persist(&self, storage_key: String, blob: Blob) {
        let store = Arc::clone(&self.store);
        let reporter = Arc::clone(&self.reporter);

        let write_key = storage_key.clone();
        let write = tokio::spawn(async move {
            if let Err(error) = store.put(&storage_key, &blob).await {
                reporter.report(StoreFailure {
                    operation: StoreOperation::Put,
                    key: Some(storage_key),
                    error,
                });
            }
        });

        let mut pending = self.lock_pending();
        pending.retain(|_, writes| {
            writes.retain(|write| !write.is_finished());
            !writes.is_empty()
        });
        pending.entry(write_key).or_default().push(write);
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, Vec<JoinHandle<()>>>> {
        self.pending_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn await_writes(writes: impl IntoIterator<Item = JoinHandle<()>>) {
    for write in writes {
        if let Err(e) = write.await {
            warn!(error = %e, "Background blob write did not complete");
        }
    }
}
