//! Cache configuration

use crate::origin::{DEFAULT_FULL_PATH, DEFAULT_THUMBNAIL_PATH, DEFAULT_TIMEOUT_SECS};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`MediaCache`](crate::MediaCache) built from settings
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding the persistent blob store
    pub cache_dir: PathBuf,
    /// Base URL of the media-serving endpoint
    pub origin_url: String,
    /// Path template for full images, `{key}` is substituted
    pub full_path: String,
    /// Path template for thumbnails, `{key}` is substituted
    pub thumbnail_path: String,
    /// Bearer token sent to the origin
    pub origin_token: Option<String>,
    pub origin_timeout_secs: u64,
    /// Age after which persisted blobs are discarded; `None` keeps them forever
    pub cache_ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache/media"),
            origin_url: "http://localhost:3001".to_string(),
            full_path: DEFAULT_FULL_PATH.to_string(),
            thumbnail_path: DEFAULT_THUMBNAIL_PATH.to_string(),
            origin_token: None,
            origin_timeout_secs: DEFAULT_TIMEOUT_SECS,
            cache_ttl_secs: None,
        }
    }
}

impl CacheConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Parse configuration from an arbitrary variable source, falling back to
    /// defaults for unset or unparseable values
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let cache_dir = lookup("MEDIA_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let origin_url = lookup("MEDIA_ORIGIN_URL").unwrap_or(defaults.origin_url);

        let full_path = lookup("MEDIA_FULL_PATH").unwrap_or(defaults.full_path);

        let thumbnail_path = lookup("MEDIA_THUMBNAIL_PATH").unwrap_or(defaults.thumbnail_path);

        let origin_token = lookup("MEDIA_ORIGIN_TOKEN").filter(|token| !token.is_empty());

        let origin_timeout_secs = lookup("MEDIA_ORIGIN_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.origin_timeout_secs);

        let cache_ttl_secs = lookup("MEDIA_CACHE_TTL_SECS").and_then(|s| s.parse::<u64>().ok());

        Self {
            cache_dir,
            origin_url,
            full_path,
            thumbnail_path,
            origin_token,
            origin_timeout_secs,
            cache_ttl_secs,
        }
    }

    pub fn origin_timeout(&self) -> Duration {
        Duration::from_secs(self.origin_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}
