//! Tracing subscriber setup for applications embedding the cache

use crate::error::{CacheError, Result};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Install a global tracing subscriber.
///
/// Honors `RUST_LOG`, defaulting this crate to `info`. With `LOG_FORMAT=json`
/// events are emitted in Cloud Logging format, otherwise as plain text.
pub fn init() -> Result<()> {
    let env_filter = EnvFilter::from_default_env().add_directive("media_cache=info".parse()?);

    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .try_init()
            .map_err(|e| CacheError::Config(format!("Failed to install subscriber: {}", e)))
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .try_init()
            .map_err(|e| CacheError::Config(format!("Failed to install subscriber: {}", e)))
    }
}
