//! The remote blob store capability consumed by the cache

use crate::error::BlobSourceError;
use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

/// Writable destination for downloaded bytes
pub type BlobSink<'a> = dyn AsyncWrite + Send + Unpin + 'a;

/// A remote object store able to check for and stream blobs by key.
///
/// Keys are passed through unmodified; sanitization only affects the local
/// file layout. The cache treats `/` and `\` as the same separator, so keys
/// differing only in separator share one cache file; stores should resolve
/// them to the same blob.
#[async_trait]
pub trait BlobSource: Send + Sync {
    /// Whether the store has a blob for `key`
    async fn exists(&self, key: &str) -> Result<bool, BlobSourceError>;

    /// Stream the bytes of `key` into `sink`.
    ///
    /// Implementations should return [`BlobSourceError::Cancelled`] promptly
    /// once `cancel` fires.
    async fn download_into(
        &self,
        key: &str,
        sink: &mut BlobSink<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), BlobSourceError>;
}
