//! Local-disk cache in front of a remote blob store
//!
//! Guarantees a fresh, complete local file for an asset key, with at most one
//! concurrent fetch per key, and hands back its path so callers can stream it
//! (including byte ranges) themselves. Freshness is the file's modification
//! time against a TTL; files are published by renaming a fully written
//! temporary sibling into place.

mod cache;
mod error;
mod freshness;
mod key;
mod lock;
mod source;
mod types;

pub use cache::FileBlobCache;
pub use error::{BlobSourceError, CacheError, Result};
pub use freshness::{is_fresh, Clock, SystemClock};
pub use key::sanitize_key;
pub use lock::{KeyLockGuard, KeyLockRegistry, RegistryClosed};
pub use source::{BlobSink, BlobSource};
pub use types::{CacheConfig, CacheStats, DEFAULT_CACHE_DIR, DEFAULT_TTL};

pub use tokio_util::sync::CancellationToken;
