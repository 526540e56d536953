use async_trait::async_trait;
use bytes::Bytes;
use cstore_core::{ByteStream, StorageResult};

/// Metadata returned by a `HEAD` request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectHead {
    pub content_length: Option<u64>,
    pub content_encoding: Option<String>,
}

/// One page of a key listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectListing {
    pub keys: Vec<String>,
    /// Present when more keys follow; pass it to the next
    /// [`ObjectStoreClient::list_objects`] call.
    pub next_continuation_token: Option<String>,
}

/// The object-store operations [`S3ContentStorage`](crate::S3ContentStorage)
/// needs.
///
/// Implementations report a missing object as `Ok(None)`. Rejected
/// credentials map to `StorageError::NotAuthorized`, every other failure to
/// `StorageError::ObjectStore`.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectHead>>;

    async fn get_object(&self, key: &str) -> StorageResult<Option<ByteStream>>;

    async fn put_object(&self, key: &str, body: Bytes) -> StorageResult<()>;

    /// Delete a batch of keys. Keys that do not exist are ignored.
    async fn delete_objects(&self, keys: &[String]) -> StorageResult<()>;

    async fn list_objects(
        &self,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
    ) -> StorageResult<ObjectListing>;
}
