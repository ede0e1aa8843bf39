//! Blob existence checks and streaming downloads over HTTP

use crate::error::{HttpBlobSourceError, Result};
use async_trait::async_trait;
use file_blob_cache::{BlobSink, BlobSource, BlobSourceError, CancellationToken};
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

/// A container of blobs addressed as `<container_url>/<key>`
pub struct HttpBlobSource {
    client: Client,
    container_url: Url,
}

fn remote(err: reqwest::Error) -> BlobSourceError {
    BlobSourceError::Remote(Box::new(err))
}

impl HttpBlobSource {
    /// Create a source for a container URL. A query string on the URL (for
    /// example a signed access token) is sent with every request.
    pub fn new(container_url: &str) -> Result<Self> {
        Self::with_client(Client::new(), container_url)
    }

    pub fn with_client(client: Client, container_url: &str) -> Result<Self> {
        let container_url = Url::parse(container_url)?;
        if container_url.cannot_be_a_base() {
            return Err(HttpBlobSourceError::InvalidContainerUrl(
                container_url.to_string(),
            ));
        }
        if !matches!(container_url.scheme(), "http" | "https") {
            return Err(HttpBlobSourceError::InvalidContainerUrl(format!(
                "unsupported scheme {}",
                container_url.scheme()
            )));
        }
        Ok(Self {
            client,
            container_url,
        })
    }

    /// URL of the blob stored under `key`; each key segment is percent-encoded.
    ///
    /// Keys split on `/` and `\` like cache paths do, so both spellings of a
    /// key address the same blob.
    pub fn blob_url(&self, key: &str) -> Url {
        let mut url = self.container_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(key.split(['/', '\\']).filter(|segment| !segment.is_empty()));
        }
        url
    }
}

#[async_trait]
impl BlobSource for HttpBlobSource {
    async fn exists(&self, key: &str) -> std::result::Result<bool, BlobSourceError> {
        let url = self.blob_url(key);
        debug!(key, "Checking blob existence");

        let response = self.client.head(url).send().await.map_err(remote)?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                warn!(key, status = %status, "Unexpected status checking blob");
                Err(BlobSourceError::remote(format!(
                    "Blob store returned status {}",
                    status
                )))
            }
        }
    }

    async fn download_into(
        &self,
        key: &str,
        sink: &mut BlobSink<'_>,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), BlobSourceError> {
        let url = self.blob_url(key);
        debug!(key, "Fetching blob from store");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BlobSourceError::Cancelled),
            response = self.client.get(url).send() => response.map_err(remote)?,
        };

        if !response.status().is_success() {
            warn!(key, status = %response.status(), "Failed to fetch blob");
            return Err(BlobSourceError::remote(format!(
                "Blob store returned status {}",
                response.status()
            )));
        }

        let mut body = response.bytes_stream();
        let mut written = 0u64;
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BlobSourceError::Cancelled),
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    sink.write_all(&bytes).await?;
                    written += bytes.len() as u64;
                }
                Some(Err(e)) => return Err(remote(e)),
                None => break,
            }
        }
        sink.flush().await?;

        debug!(key, size = written, "Fetched blob from store");
        Ok(())
    }
}
