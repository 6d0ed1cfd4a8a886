//! File-backed blob store that survives process restarts

use crate::error::Result;
use crate::store::BlobStore;
use crate::types::{Blob, BlobMetadata, StoreStats};
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

const BLOB_EXT: &str = "blob";
const META_EXT: &str = "json";
const TMP_EXT: &str = "tmp";

/// A blob store keeping each entry as a data file plus a JSON metadata file.
///
/// File names are derived from the SHA-256 digest of the key, so arbitrary
/// keys map to safe paths. Writes land in a temporary file and are renamed
/// into place, data before metadata, and a reader only trusts an entry whose
/// metadata is present and whose data matches the recorded size.
pub struct FileBlobStore {
    /// Directory owned by this keyspace
    root: PathBuf,
    /// Entries older than this are treated as absent
    ttl: Option<Duration>,
    /// Disambiguates temporary files of concurrent writes
    write_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FileBlobStore {
    /// Create a store rooted at `root`. Call [`FileBlobStore::init`] before use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ttl: None,
            write_seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Expire entries older than `ttl`
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure the store directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        info!(root = ?self.root, ttl = ?self.ttl, "Blob store initialized");
        Ok(())
    }

    /// File stem for a key: hex-encoded SHA-256 of the key
    pub fn file_stem(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn blob_path(&self, stem: &str) -> PathBuf {
        self.root.join(format!("{}.{}", stem, BLOB_EXT))
    }

    fn meta_path(&self, stem: &str) -> PathBuf {
        self.root.join(format!("{}.{}", stem, META_EXT))
    }

    async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{}.{}", seq, TMP_EXT));

        if let Err(e) = fs::write(&tmp, data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove both files of an entry, metadata first
    async fn remove_entry(&self, stem: &str) -> Result<()> {
        remove_if_exists(&self.meta_path(stem)).await?;
        remove_if_exists(&self.blob_path(stem)).await
    }

    fn is_expired(&self, metadata: &BlobMetadata) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        (Utc::now() - metadata.created_at)
            .to_std()
            .map(|age| age > ttl)
            .unwrap_or(false)
    }

    fn miss(&self) -> Result<Option<Blob>> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Blob>> {
        let stem = Self::file_stem(key);

        let raw_metadata = match fs::read(self.meta_path(&stem)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return self.miss(),
            Err(e) => return Err(e.into()),
        };

        let metadata: BlobMetadata = match serde_json::from_slice(&raw_metadata) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(key, error = %e, "Corrupt blob metadata, removing entry");
                self.remove_entry(&stem).await?;
                return self.miss();
            }
        };

        if metadata.key != key {
            warn!(key, stored_key = %metadata.key, "Blob metadata key mismatch");
            return self.miss();
        }

        if self.is_expired(&metadata) {
            debug!(key, created_at = %metadata.created_at, "Blob entry expired");
            self.remove_entry(&stem).await?;
            return self.miss();
        }

        let data = match fs::read(self.blob_path(&stem)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(key, "Blob data missing, removing entry");
                self.remove_entry(&stem).await?;
                return self.miss();
            }
            Err(e) => return Err(e.into()),
        };

        if data.len() as u64 != metadata.size {
            warn!(
                key,
                expected = metadata.size,
                actual = data.len(),
                "Blob size mismatch, removing entry"
            );
            self.remove_entry(&stem).await?;
            return self.miss();
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(key, size = data.len(), "Blob store hit");
        Ok(Some(Blob::new(data, metadata.content_type)))
    }

    async fn put(&self, key: &str, blob: &Blob) -> Result<()> {
        let stem = Self::file_stem(key);
        let metadata = BlobMetadata {
            key: key.to_string(),
            content_type: blob.content_type().to_string(),
            size: blob.len() as u64,
            created_at: Utc::now(),
        };
        let raw_metadata = serde_json::to_vec(&metadata)?;

        self.write_atomic(&self.blob_path(&stem), blob.data()).await?;
        self.write_atomic(&self.meta_path(&stem), &raw_metadata).await?;

        debug!(key, size = metadata.size, "Stored blob");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.remove_entry(&Self::file_stem(key)).await
    }

    async fn clear(&self) -> Result<()> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0usize;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if !is_store_file(&path) {
                continue;
            }
            remove_if_exists(&path).await?;
            removed += 1;
        }

        info!(root = ?self.root, removed, "Blob store cleared");
        Ok(())
    }

    async fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ..StoreStats::default()
        };

        let Ok(mut dir) = fs::read_dir(&self.root).await else {
            return stats;
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(BLOB_EXT) {
                continue;
            }
            if let Ok(file_metadata) = entry.metadata().await {
                stats.entries += 1;
                stats.total_size += file_metadata.len();
            }
        }
        stats
    }
}

/// Files written by this store: `<digest>.blob`, `<digest>.json` and
/// leftover `<digest>.<seq>.tmp` files from interrupted writes
fn is_store_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    let Some((stem, ext)) = name.split_once('.') else {
        return false;
    };
    let is_digest = stem.len() == 64 && stem.chars().all(|c| c.is_ascii_hexdigit());
    is_digest && (ext == BLOB_EXT || ext == META_EXT || ext.ends_with(TMP_EXT))
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn open(root: &Path) -> FileBlobStore {
        let store = FileBlobStore::new(root);
        store.init().await.unwrap();
        store
    }

    #[test]
    fn test_file_stem_generation() {
        let stem1 = FileBlobStore::file_stem("full/m1");
        let stem2 = FileBlobStore::file_stem("full/m1");
        let stem3 = FileBlobStore::file_stem("thumbnail/m1");

        assert_eq!(stem1, stem2);
        assert_ne!(stem1, stem3);
        assert_eq!(stem1.len(), 64);
        assert!(stem1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_is_store_file() {
        let stem = FileBlobStore::file_stem("full/m1");
        assert!(is_store_file(Path::new(&format!("{}.blob", stem))));
        assert!(is_store_file(Path::new(&format!("{}.json", stem))));
        assert!(is_store_file(Path::new(&format!("{}.blob.7.tmp", stem))));
        assert!(!is_store_file(Path::new("notes.txt")));
        assert!(!is_store_file(Path::new("settings.json")));
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let dir = tempdir().unwrap();
        let store = open(dir.path()).await;

        let blob = Blob::new(b"\x89PNG fake image".to_vec(), "image/png");
        store.put("full/m1", &blob).await.unwrap();

        let fetched = store.get("full/m1").await.unwrap().unwrap();
        assert_eq!(fetched, blob);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let dir = tempdir().unwrap();
        let store = open(dir.path()).await;

        assert!(store.get("full/nonexistent").await.unwrap().is_none());
        assert_eq!(store.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let dir = tempdir().unwrap();
        let store = open(dir.path()).await;

        store
            .put("full/m1", &Blob::new(b"first".to_vec(), "image/png"))
            .await
            .unwrap();
        store
            .put("full/m1", &Blob::new(b"second".to_vec(), "image/webp"))
            .await
            .unwrap();

        let fetched = store.get("full/m1").await.unwrap().unwrap();
        assert_eq!(fetched.data().as_ref(), b"second");
        assert_eq!(fetched.content_type(), "image/webp");
        assert_eq!(store.stats().await.entries, 1);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = open(dir.path()).await;
            store
                .put("full/m1", &Blob::new(b"persisted".to_vec(), "image/jpeg"))
                .await
                .unwrap();
        }

        let reopened = open(dir.path()).await;
        let fetched = reopened.get("full/m1").await.unwrap().unwrap();
        assert_eq!(fetched.data().as_ref(), b"persisted");
        assert_eq!(fetched.content_type(), "image/jpeg");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = open(dir.path()).await;

        store
            .put("full/m1", &Blob::new(b"data".to_vec(), "image/png"))
            .await
            .unwrap();
        store.delete("full/m1").await.unwrap();
        store.delete("full/m1").await.unwrap();
        store.delete("full/never-stored").await.unwrap();

        assert!(store.get("full/m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_only_removes_store_files() {
        let dir = tempdir().unwrap();
        let store = open(dir.path()).await;

        store
            .put("full/a", &Blob::new(b"a".to_vec(), "image/png"))
            .await
            .unwrap();
        store
            .put("thumbnail/a", &Blob::new(b"ta".to_vec(), "image/png"))
            .await
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        store.clear().await.unwrap();
        store.clear().await.unwrap();

        assert!(store.get("full/a").await.unwrap().is_none());
        assert!(store.get("thumbnail/a").await.unwrap().is_none());
        assert_eq!(store.stats().await.entries, 0);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_clear_missing_root_is_ok() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::new(dir.path().join("never-created"));
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_a_miss() {
        let dir = tempdir().unwrap();
        let store = open(dir.path()).await;

        store
            .put("full/m1", &Blob::new(b"data".to_vec(), "image/png"))
            .await
            .unwrap();
        let stem = FileBlobStore::file_stem("full/m1");
        std::fs::write(store.meta_path(&stem), b"{not json").unwrap();

        assert!(store.get("full/m1").await.unwrap().is_none());
        assert!(!store.blob_path(&stem).exists());
    }

    #[tokio::test]
    async fn test_truncated_data_is_a_miss() {
        let dir = tempdir().unwrap();
        let store = open(dir.path()).await;

        store
            .put("full/m1", &Blob::new(b"0123456789".to_vec(), "image/png"))
            .await
            .unwrap();
        let stem = FileBlobStore::file_stem("full/m1");
        std::fs::write(store.blob_path(&stem), b"01234").unwrap();

        assert!(store.get("full/m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::new(dir.path()).with_ttl(Duration::from_millis(1));
        store.init().await.unwrap();

        store
            .put("full/m1", &Blob::new(b"data".to_vec(), "image/png"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(store.get("full/m1").await.unwrap().is_none());
        assert_eq!(store.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = tempdir().unwrap();
        let store = open(dir.path()).await;

        let stats = store.stats().await;
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_size, 0);

        store
            .put("full/m1", &Blob::new(b"test data".to_vec(), "text/plain"))
            .await
            .unwrap();
        store.get("full/m1").await.unwrap();
        store.get("full/m2").await.unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_size, 9);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
