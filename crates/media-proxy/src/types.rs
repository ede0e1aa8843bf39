//! Core types for the media proxy

use file_blob_cache::CacheStats;
use serde::Serialize;
use std::path::PathBuf;

/// Configuration for the media proxy
#[derive(Debug, Clone)]
pub struct MediaProxyConfig {
    pub port: u16,
    pub cache_dir: PathBuf,
    pub cache_ttl_secs: u64,
    /// Container URL of the remote blob store
    pub origin_url: String,
}

impl Default for MediaProxyConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            cache_dir: PathBuf::from(file_blob_cache::DEFAULT_CACHE_DIR),
            cache_ttl_secs: file_blob_cache::DEFAULT_TTL.as_secs(),
            origin_url: String::new(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
