//! Two-tier media cache
//!
//! Hands out cheap, revocable [`Handle`]s to media bytes (full images and
//! thumbnails) keyed by an opaque media key. A lookup consults an in-memory
//! handle table, then a persistent blob store that survives restarts, and
//! finally the media origin, writing the result back through both tiers.
//!
//! ```no_run
//! # async fn run() -> media_cache::Result<()> {
//! use media_cache::{CacheConfig, MediaCache};
//!
//! let cache = MediaCache::from_config(&CacheConfig::from_env()).await?;
//! let handle = cache.resolve("m1").await?;
//! if let Some(bytes) = handle.bytes() {
//!     println!("{} bytes of {}", bytes.len(), handle.content_type());
//! }
//! cache.evict("m1").await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod handle;
pub mod logging;
pub mod origin;
pub mod types;

pub use cache::{MediaCache, StoreErrorObserver, StoreFailure, StoreOperation};
pub use config::CacheConfig;
pub use error::{CacheError, OriginError, Result};
pub use handle::{Handle, HandleStats, HandleTable};
pub use origin::{HttpMediaOrigin, MediaOrigin};
pub use types::{CacheKey, CacheStats, MediaKey, Variant};

pub use media_blob_store::{Blob, BlobStore, FileBlobStore, MemoryBlobStore, StoreError};
