//! HTTP Blob Source
//!
//! Reads blobs from an object store container exposed over HTTP(S), such as a
//! storage bucket or a container URL carrying a signed query token, and
//! plugs it into `file-blob-cache` as a [`BlobSource`](file_blob_cache::BlobSource).

pub mod client;
pub mod error;

pub use client::HttpBlobSource;
pub use error::{HttpBlobSourceError, Result};
