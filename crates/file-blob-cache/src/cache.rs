//! Single-flight population of the on-disk cache

use crate::error::{CacheError, Result};
use crate::freshness::{is_fresh, Clock, SystemClock};
use crate::key::sanitize_key;
use crate::lock::KeyLockRegistry;
use crate::source::BlobSource;
use crate::types::{CacheConfig, CacheStats};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const PARTIAL_MARKER: &str = ".download-";

/// A cache of remote blobs materialized as plain files under a root directory.
///
/// Files are served straight from disk; their modification time is the only
/// freshness signal. At most one download per key is in flight, and a file
/// at its final path is always complete.
pub struct FileBlobCache {
    /// Directory where cached blobs are stored
    cache_dir: PathBuf,
    /// How long a file stays fresh after it was written
    ttl: Duration,
    clock: Arc<dyn Clock>,
    locks: KeyLockRegistry,
    closed: AtomicBool,
    /// Set by the first `ensure_cached`; partial downloads may exist from then on
    serving: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    downloads: AtomicU64,
    failures: AtomicU64,
}

impl FileBlobCache {
    /// Create a new cache; relative directories are resolved against the
    /// working directory.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Ok(Self {
            cache_dir: config.resolved_dir()?,
            ttl: config.ttl,
            clock: Arc::new(SystemClock),
            locks: KeyLockRegistry::new(),
            closed: AtomicBool::new(false),
            serving: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            downloads: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    /// Replace the clock used for freshness decisions
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Ensure the cache directory exists and sweep partial downloads left by
    /// an earlier process.
    ///
    /// Call once before serving. The sweep is skipped if `ensure_cached` has
    /// already run, since the partial files would then belong to live downloads.
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).await?;
        if self.serving.load(Ordering::Acquire) {
            warn!(cache_dir = ?self.cache_dir, "Cache already serving, skipping partial download sweep");
            return Ok(());
        }
        let cleaned = sweep_partial_downloads(&self.cache_dir).await;
        info!(cache_dir = ?self.cache_dir, cleaned, "Cache initialized");
        Ok(())
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Absolute path a key is cached at
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = sanitize_key(key);
        if relative.as_os_str().is_empty() {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.cache_dir.join(relative))
    }

    /// Make sure a fresh copy of `key` exists on disk and return its path.
    ///
    /// A fresh file is returned without locking or contacting `source`.
    /// Otherwise the call joins the single download for the key: the first
    /// caller checks `source`, streams into a temporary sibling file and
    /// renames it over the final path; callers queued behind it find the new
    /// file fresh and return. A stale file is left in place until its
    /// replacement is complete, so a failed refresh does not lose it.
    pub async fn ensure_cached(
        &self,
        key: &str,
        source: &dyn BlobSource,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        self.serving.store(true, Ordering::Release);
        if self.is_closed() {
            return Err(CacheError::Closed);
        }
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }

        let final_path = self.path_for(key)?;
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if self.is_fresh_file(&final_path).await? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "Cache hit");
            return Ok(final_path);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CacheError::Cancelled),
            result = self.populate(key, &final_path, source, cancel) => result,
        };

        if let Err(e) = &result {
            self.failures.fetch_add(1, Ordering::Relaxed);
            match e {
                CacheError::Cancelled => debug!(key, "Cache population cancelled"),
                CacheError::NotFound(_) => debug!(key, "Blob not found at source"),
                _ => warn!(key, error = %e, "Cache population failed"),
            }
        }
        result
    }

    async fn populate(
        &self,
        key: &str,
        final_path: &Path,
        source: &dyn BlobSource,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let lock_key = final_path.to_string_lossy();
        let _guard = self
            .locks
            .acquire(&lock_key)
            .await
            .map_err(|_| CacheError::Closed)?;
        // close() may have run between the entry check and getting the lock
        if self.is_closed() {
            return Err(CacheError::Closed);
        }

        // Another caller may have published while we waited
        if self.is_fresh_file(final_path).await? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "Cache hit after wait");
            return Ok(final_path.to_path_buf());
        }

        if !source.exists(key).await? {
            return Err(CacheError::NotFound(key.to_string()));
        }

        info!(key, path = ?final_path, "Downloading blob to cache");
        let (partial, file) = PartialDownload::create(final_path).await?;
        if let Err(e) = write_blob(key, source, file, cancel).await {
            partial.discard().await;
            return Err(e);
        }
        partial.publish(final_path).await?;

        self.downloads.fetch_add(1, Ordering::Relaxed);
        debug!(key, path = ?final_path, "Published cached blob");
        Ok(final_path.to_path_buf())
    }

    async fn is_fresh_file(&self, path: &Path) -> Result<bool> {
        let metadata = match fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Ok(false);
        }

        let last_write: DateTime<Utc> = metadata.modified()?.into();
        let fresh = is_fresh(last_write, self.ttl, self.clock.now());
        if !fresh {
            debug!(path = ?path, %last_write, "Cache entry expired");
        }
        Ok(fresh)
    }

    /// Current cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            in_flight: self.locks.len(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shut the cache down. Waiters on key locks wake with
    /// [`CacheError::Closed`]; downloads already running finish or fail on
    /// their own cancellation. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let released = self.locks.close_all();
        info!(released, "Cache closed");
    }
}

impl Drop for FileBlobCache {
    fn drop(&mut self) {
        self.close();
    }
}

/// Stream a blob into `file` and make it durable; the file is closed on return
async fn write_blob(
    key: &str,
    source: &dyn BlobSource,
    mut file: fs::File,
    cancel: &CancellationToken,
) -> Result<()> {
    source.download_into(key, &mut file, cancel).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

/// A temporary file next to a cache file, removed unless published.
///
/// The name has a fixed length so any legal final name still fits.
struct PartialDownload {
    path: PathBuf,
    settled: bool,
}

impl PartialDownload {
    async fn create(final_path: &Path) -> Result<(Self, fs::File)> {
        let name = format!("{}{}", PARTIAL_MARKER, Uuid::new_v4().simple());
        let path = final_path.with_file_name(name);

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok((
            Self {
                path,
                settled: false,
            },
            file,
        ))
    }

    /// Rename over the final path; replaces any previous file in one step
    async fn publish(mut self, final_path: &Path) -> Result<()> {
        match fs::rename(&self.path, final_path).await {
            Ok(()) => {
                self.settled = true;
                Ok(())
            }
            Err(e) => {
                self.discard().await;
                Err(e.into())
            }
        }
    }

    async fn discard(mut self) {
        log_removal(&self.path, fs::remove_file(&self.path).await);
        self.settled = true;
    }
}

impl Drop for PartialDownload {
    // Only reached when the owning future is dropped mid-download
    fn drop(&mut self) {
        if !self.settled {
            log_removal(&self.path, std::fs::remove_file(&self.path));
        }
    }
}

fn log_removal(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => debug!(path = ?path, "Removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = ?path, error = %e, "Failed to remove partial download"),
    }
}

fn is_partial_download(file_name: &str) -> bool {
    file_name
        .strip_prefix(PARTIAL_MARKER)
        .map(|suffix| suffix.len() == 32 && suffix.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

/// Remove partial downloads anywhere under `root`, returning how many went
async fn sweep_partial_downloads(root: &Path) -> u64 {
    let mut cleaned = 0;
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = ?dir, error = %e, "Failed to read cache directory");
                continue;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => pending.push(path),
                Ok(file_type) if file_type.is_file() => {
                    let partial = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .map(is_partial_download)
                        .unwrap_or(false);
                    if !partial {
                        continue;
                    }
                    match fs::remove_file(&path).await {
                        Ok(()) => cleaned += 1,
                        Err(e) => {
                            warn!(path = ?path, error = %e, "Failed to remove orphaned partial download")
                        }
                    }
                }
                _ => {}
            }
        }
    }
    cleaned
}
