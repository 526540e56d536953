use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};

use crate::error::StorageResult;
use crate::item::{stream_to_bytes, ByteStream, ContentItem};
use crate::traits::{ContentStorage, FileIdStream};
use crate::types::FileInfo;

/// In-memory, HashMap-based content storage.
///
/// Intended for tests and embedding. Streams are buffered fully on store and
/// records are always kept plain: `store_stream_and_compress` behaves like
/// `store_stream`.
pub struct InMemoryContentStorage {
    records: RwLock<HashMap<String, Bytes>>,
}

impl InMemoryContentStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().expect("lock poisoned").is_empty()
    }

    /// Total payload bytes across all records.
    pub fn total_bytes(&self) -> u64 {
        self.records
            .read()
            .expect("lock poisoned")
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }

    fn get(&self, id: &str) -> Option<Bytes> {
        self.records.read().expect("lock poisoned").get(id).cloned()
    }
}

impl Default for InMemoryContentStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStorage for InMemoryContentStorage {
    async fn store_stream(&self, id: &str, content: ByteStream) -> StorageResult<()> {
        let data = stream_to_bytes(content).await?;
        self.records
            .write()
            .expect("lock poisoned")
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn store_stream_and_compress(&self, id: &str, content: ByteStream) -> StorageResult<()> {
        self.store_stream(id, content).await
    }

    async fn retrieve(&self, id: &str) -> StorageResult<Option<ContentItem>> {
        Ok(self.get(id).map(ContentItem::from_bytes))
    }

    async fn exist(&self, id: &str) -> StorageResult<bool> {
        Ok(self.records.read().expect("lock poisoned").contains_key(id))
    }

    async fn delete(&self, ids: &[String]) -> StorageResult<()> {
        let mut records = self.records.write().expect("lock poisoned");
        for id in ids {
            records.remove(id);
        }
        Ok(())
    }

    async fn file_info(&self, id: &str) -> StorageResult<Option<FileInfo>> {
        Ok(self.get(id).map(|data| FileInfo::plain(data.len() as u64)))
    }

    fn all_file_ids(&self, prefix: Option<&str>) -> FileIdStream {
        let records = self.records.read().expect("lock poisoned");
        let mut ids: Vec<String> = records
            .keys()
            .filter(|id| prefix.map_or(true, |p| id.starts_with(p)))
            .cloned()
            .collect();
        ids.sort();
        stream::iter(ids).boxed()
    }
}

impl std::fmt::Debug for InMemoryContentStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContentStorage")
            .field("record_count", &self.len())
            .finish()
    }
}
