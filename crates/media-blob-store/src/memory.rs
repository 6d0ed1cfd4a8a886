//! In-process blob store

use crate::error::Result;
use crate::store::BlobStore;
use crate::types::{Blob, StoreStats};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// A blob store held entirely in memory; contents are lost with the process
#[derive(Default)]
pub struct MemoryBlobStore {
    entries: RwLock<HashMap<String, Blob>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Blob>> {
        let blob = self.entries.read().await.get(key).cloned();
        let counter = if blob.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(blob)
    }

    async fn put(&self, key: &str, blob: &Blob) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), blob.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn stats(&self) -> StoreStats {
        let entries = self.entries.read().await;
        StoreStats {
            entries: entries.len(),
            total_size: entries.values().map(|blob| blob.len() as u64).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
