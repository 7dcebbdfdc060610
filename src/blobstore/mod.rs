//! Blob storage abstraction.
//!
//! Raw uploads, watermarks, and processed outputs all live in one
//! key-addressed object store. The trait keeps the pipeline testable against
//! an in-memory implementation; production uses S3.

pub mod key;
mod memory;
mod s3;

pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Errors from blob storage operations.
#[derive(Debug)]
pub enum BlobStoreError {
    /// No object stored under the requested key
    NotFound(String),

    /// Backend failure (network, auth, storage)
    Backend(String),
}

impl fmt::Display for BlobStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "Object not found: {}", key),
            Self::Backend(msg) => write!(f, "Storage backend error: {}", msg),
        }
    }
}

impl std::error::Error for BlobStoreError {}

/// Key-addressed binary object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store an object under the given key.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), BlobStoreError>;

    /// Fetch the object stored under the given key.
    async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError>;
}
