//! Cache types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default directory, relative to the working directory
pub const DEFAULT_CACHE_DIR: &str = "media-cache";

/// Default freshness window: one day
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for the file blob cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub cache_dir: PathBuf,
    pub ttl: Duration,
}

impl CacheConfig {
    pub fn new(cache_dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ttl,
        }
    }

    /// The cache directory as an absolute path; relative directories are
    /// resolved against the current working directory.
    pub fn resolved_dir(&self) -> std::io::Result<PathBuf> {
        if self.cache_dir.is_absolute() {
            Ok(self.cache_dir.clone())
        } else {
            Ok(std::env::current_dir()?.join(&self.cache_dir))
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            ttl: DEFAULT_TTL,
        }
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Requests answered from a fresh file, with or without waiting on the key lock
    pub hits: u64,
    /// Requests that had to take the key lock
    pub misses: u64,
    /// Successful downloads published into the cache
    pub downloads: u64,
    /// Populations that ended in an error or cancellation
    pub failures: u64,
    /// Keys currently being populated or waited on
    pub in_flight: usize,
}
