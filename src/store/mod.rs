//! Conditional blob storage and the versioned state document on top of it.

mod fs;
mod memory;
mod state;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use state::{state_key, Versioned, VersionedStateStore};

use async_trait::async_trait;
use bytes::Bytes;

/// Opaque version token. Changes on every successful write.
pub type ETag = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub body: Bytes,
    pub etag: ETag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    /// Succeed only if the current version is exactly this token.
    IfMatch(ETag),
    /// Succeed only if nothing is stored under the key yet.
    IfAbsent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The write condition did not hold.
    Conflict(String),
    Corrupt { key: String, reason: String },
    Io(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Conflict(key) => write!(f, "write condition failed for {key}"),
            StoreError::Corrupt { key, reason } => write!(f, "corrupt blob {key}: {reason}"),
            StoreError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Key/value storage with compare-and-swap writes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Blob>, StoreError>;

    async fn put(&self, key: &str, body: Bytes, condition: WriteCondition) -> Result<ETag, StoreError>;

    /// Keys starting with `prefix`, ascending.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

pub(crate) fn fresh_etag() -> ETag {
    ulid::Ulid::new().to_string()
}
