//! Error types for the file blob cache

use std::fmt;

/// Errors a [`BlobSource`](crate::BlobSource) may report while checking or streaming a blob
#[derive(Debug)]
pub enum BlobSourceError {
    /// The remote store failed (bad status, dropped connection, ...)
    Remote(Box<dyn std::error::Error + Send + Sync>),
    /// Writing into the local sink failed
    Io(Box<std::io::Error>),
    /// The caller's cancellation token fired mid-transfer
    Cancelled,
}

impl BlobSourceError {
    /// Build a remote error from a plain message
    pub fn remote(msg: impl Into<String>) -> Self {
        BlobSourceError::Remote(msg.into().into())
    }
}

impl fmt::Display for BlobSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobSourceError::Remote(err) => write!(f, "Remote error: {}", err),
            BlobSourceError::Io(err) => write!(f, "IO error: {}", err),
            BlobSourceError::Cancelled => write!(f, "Download cancelled"),
        }
    }
}

impl std::error::Error for BlobSourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BlobSourceError::Remote(err) => Some(err.as_ref()),
            BlobSourceError::Io(err) => Some(err.as_ref()),
            BlobSourceError::Cancelled => None,
        }
    }
}

impl From<std::io::Error> for BlobSourceError {
    fn from(err: std::io::Error) -> Self {
        BlobSourceError::Io(Box::new(err))
    }
}

/// Errors surfaced by [`FileBlobCache::ensure_cached`](crate::FileBlobCache::ensure_cached)
#[derive(Debug)]
pub enum CacheError {
    /// The blob source reports the key does not exist
    NotFound(String),
    /// The blob source failed; the cache is left in its prior state
    Remote(Box<dyn std::error::Error + Send + Sync>),
    /// Local filesystem failure
    Io(Box<std::io::Error>),
    /// The caller cancelled before completion
    Cancelled,
    /// The cache has been shut down
    Closed,
    /// The key sanitizes to an empty path
    InvalidKey(String),
}

impl CacheError {
    /// Cancellation is a caller decision, not a failure worth logging as an error
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CacheError::Cancelled)
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::NotFound(key) => write!(f, "Blob not found: {}", key),
            CacheError::Remote(err) => write!(f, "Remote error: {}", err),
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Cancelled => write!(f, "Operation cancelled"),
            CacheError::Closed => write!(f, "Cache is closed"),
            CacheError::InvalidKey(key) => write!(f, "Invalid cache key: {:?}", key),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Remote(err) => Some(err.as_ref()),
            CacheError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<BlobSourceError> for CacheError {
    fn from(err: BlobSourceError) -> Self {
        match err {
            BlobSourceError::Remote(err) => CacheError::Remote(err),
            BlobSourceError::Io(err) => CacheError::Io(err),
            BlobSourceError::Cancelled => CacheError::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = CacheError::NotFound("images/logo.png".to_string());
        assert_eq!(format!("{}", err), "Blob not found: images/logo.png");
    }

    #[test]
    fn test_source_error_conversion() {
        let err: CacheError = BlobSourceError::remote("status 500").into();
        assert!(matches!(err, CacheError::Remote(_)));
        assert!(format!("{}", err).contains("status 500"));

        let err: CacheError = BlobSourceError::Cancelled.into();
        assert!(err.is_cancelled());

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: CacheError = BlobSourceError::from(io).into();
        assert!(matches!(err, CacheError::Io(_)));
    }

    #[test]
    fn test_io_error_has_source() {
        let err = CacheError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        ));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_cancelled());
    }
}
