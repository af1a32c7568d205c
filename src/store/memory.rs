use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{fresh_etag, Blob, BlobStore, ETag, StoreError, WriteCondition};

/// In-process store. The condition check and the write happen under the
/// shard lock of the key's entry.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Blob>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Blob>, StoreError> {
        Ok(self.blobs.get(key).map(|b| b.clone()))
    }

    async fn put(&self, key: &str, body: Bytes, condition: WriteCondition) -> Result<ETag, StoreError> {
        let etag = fresh_etag();
        let blob = Blob { body, etag: etag.clone() };
        match (self.blobs.entry(key.to_string()), condition) {
            (Entry::Vacant(slot), WriteCondition::IfAbsent) => {
                slot.insert(blob);
            }
            (Entry::Occupied(mut slot), WriteCondition::IfMatch(expected)) if slot.get().etag == expected => {
                slot.insert(blob);
            }
            _ => return Err(StoreError::Conflict(key.to_string())),
        }
        Ok(etag)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .blobs
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
