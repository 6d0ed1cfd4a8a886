//! Core types for the media cache

use crate::error::{CacheError, Result};
use crate::handle::HandleStats;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, caller-supplied identifier of a media object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaKey(String);

impl MediaKey {
    /// Validate a key; empty and whitespace-only keys are rejected
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(CacheError::InvalidKey(
                "media key must not be empty".to_string(),
            ));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MediaKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derivative of a media object; each variant is cached independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Full,
    Thumbnail,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Full => "full",
            Variant::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A media key qualified by its variant; the unit both tiers are keyed by
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub key: MediaKey,
    pub variant: Variant,
}

impl CacheKey {
    pub fn new(key: MediaKey, variant: Variant) -> Self {
        Self { key, variant }
    }

    /// Key used in the persistent tier, namespaced by variant
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.variant, self.key)
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub store_hits: u64,
    pub origin_fetches: u64,
    pub origin_failures: u64,
    pub store_failures: u64,
    pub handles: HandleStats,
}
