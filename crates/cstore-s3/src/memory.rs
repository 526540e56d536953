use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use cstore_core::{bytes_to_stream, ByteStream, StorageError, StorageResult};

use crate::client::{ObjectHead, ObjectListing, ObjectStoreClient};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Clone, Debug)]
struct StoredObject {
    body: Bytes,
    content_encoding: Option<String>,
}

/// In-process [`ObjectStoreClient`] for tests and local development.
///
/// Listings are paged like S3: at most `page_size` keys per call, in key
/// order, with the last returned key as continuation token.
pub struct InMemoryObjectStoreClient {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    page_size: usize,
    unavailable: AtomicBool,
}

impl InMemoryObjectStoreClient {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create a client whose listings return at most `page_size` keys.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Store an object with an explicit `Content-Encoding`, as an uploader
    /// other than this crate would.
    pub fn insert_object(&self, key: impl Into<String>, body: impl Into<Bytes>, content_encoding: Option<&str>) {
        self.objects.write().expect("lock poisoned").insert(
            key.into(),
            StoredObject {
                body: body.into(),
                content_encoding: content_encoding.map(str::to_owned),
            },
        );
    }

    /// Make every subsequent call fail with `StorageError::ObjectStore`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All stored keys, in order.
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().expect("lock poisoned").keys().cloned().collect()
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::ObjectStore("object store unavailable".to_string()));
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().expect("lock poisoned").get(key).cloned()
    }
}

impl Default for InMemoryObjectStoreClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryObjectStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.objects.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("InMemoryObjectStoreClient")
            .field("object_count", &count)
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[async_trait]
impl ObjectStoreClient for InMemoryObjectStoreClient {
    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectHead>> {
        self.check_available()?;
        Ok(self.get(key).map(|object| ObjectHead {
            content_length: Some(object.body.len() as u64),
            content_encoding: object.content_encoding,
        }))
    }

    async fn get_object(&self, key: &str) -> StorageResult<Option<ByteStream>> {
        self.check_available()?;
        Ok(self.get(key).map(|object| bytes_to_stream(object.body)))
    }

    async fn put_object(&self, key: &str, body: Bytes) -> StorageResult<()> {
        self.check_available()?;
        self.insert_object(key, body, None);
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> StorageResult<()> {
        self.check_available()?;
        let mut objects = self.objects.write().expect("lock poisoned");
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    async fn list_objects(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
    ) -> StorageResult<ObjectListing> {
        self.check_available()?;
        let objects = self.objects.read().expect("lock poisoned");
        let start = match continuation_token {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Unbounded,
        };
        let mut keys: Vec<String> = objects
            .range((start, Bound::Unbounded))
            .map(|(key, _)| key)
            .filter(|key| prefix.map_or(true, |p| key.starts_with(p)))
            .take(self.page_size + 1)
            .cloned()
            .collect();

        let next_continuation_token = if keys.len() > self.page_size {
            keys.truncate(self.page_size);
            keys.last().cloned()
        } else {
            None
        };
        Ok(ObjectListing {
            keys,
            next_continuation_token,
        })
    }
}
