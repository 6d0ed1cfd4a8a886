//! Persistent blob storage for the media cache
//!
//! A [`BlobStore`] maps storage keys to immutable blobs (raw bytes plus a
//! content type). [`FileBlobStore`] keeps entries on disk so they survive a
//! process restart; [`MemoryBlobStore`] lives only as long as the process.

mod error;
mod file;
mod memory;
mod store;
mod types;

pub use error::{Result, StoreError};
pub use file::FileBlobStore;
pub use memory::MemoryBlobStore;
pub use store::BlobStore;
pub use types::{Blob, BlobMetadata, StoreStats, DEFAULT_CONTENT_TYPE};
