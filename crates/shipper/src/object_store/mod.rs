//! Remote object storage.
//!
//! The shipper only needs three calls: put an object with metadata, look up
//! an object's size and metadata, and read an object back. Backends:
//!
//! - [`S3ObjectStore`]: S3 or any S3-compatible service
//! - [`MemoryObjectStore`]: in-process map for tests and dry runs

mod memory;
mod s3;

pub use memory::MemoryObjectStore;
pub use s3::{S3ObjectStore, S3Settings};

use crate::error::ObjectStoreError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

/// Size and metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Body size in bytes
    pub size: u64,
    /// User metadata
    pub metadata: HashMap<String, String>,
}

/// Acknowledgement of a put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    /// Object key
    pub key: String,
    /// Entity tag, when the backend returns one
    pub etag: Option<String>,
}

/// Remote object storage used by the shipper.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`, replacing any existing object.
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        metadata: HashMap<String, String>,
    ) -> Result<PutReceipt, ObjectStoreError>;

    /// Look up an object. `Ok(None)` when it does not exist.
    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>, ObjectStoreError>;

    /// Read an object's body.
    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;

    /// Human-readable destination, e.g. `s3://bucket`.
    fn location(&self) -> String;
}
