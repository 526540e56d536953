use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::BoxStream;

use crate::error::{StorageError, StorageResult};
use crate::item::{ByteStream, ContentItem};
use crate::types::FileInfo;

/// Lazy sequence of record ids produced by [`ContentStorage::all_file_ids`].
pub type FileIdStream = BoxStream<'static, String>;

/// Blob storage keyed by opaque string ids.
///
/// All implementations must satisfy these invariants:
/// - A missing record is reported as `Ok(None)` / `Ok(false)`, never as `Err`.
/// - A store under an existing id fully replaces the previous record.
/// - After `delete`, no representation of the record survives.
/// - A write that fails never leaves a record that reads back as complete.
/// - Batch operations are not snapshots: each id is checked independently.
#[async_trait]
pub trait ContentStorage: Send + Sync {
    /// Store `content` under `id`, replacing any existing record.
    async fn store_stream(&self, id: &str, content: ByteStream) -> StorageResult<()>;

    /// Store `content` under `id` and let the backend decide whether to keep
    /// it compressed. Backends without local compression store it plain.
    async fn store_stream_and_compress(&self, id: &str, content: ByteStream) -> StorageResult<()>;

    /// Look up a record.
    ///
    /// Returns `Ok(None)` if the record does not exist.
    async fn retrieve(&self, id: &str) -> StorageResult<Option<ContentItem>>;

    /// Check whether a record exists.
    async fn exist(&self, id: &str) -> StorageResult<bool>;

    /// Check several records at once.
    ///
    /// Default implementation runs `exist()` for every id concurrently.
    async fn exist_multiple(&self, ids: &[String]) -> StorageResult<HashMap<String, bool>> {
        let checks = ids.iter().map(|id| async move {
            let found = self.exist(id).await?;
            Ok::<_, StorageError>((id.clone(), found))
        });
        join_all(checks).await.into_iter().collect()
    }

    /// Delete records. Ids that do not exist are ignored.
    async fn delete(&self, ids: &[String]) -> StorageResult<()>;

    /// Read a record's metadata without opening it.
    ///
    /// Default implementation goes through `retrieve()`.
    async fn file_info(&self, id: &str) -> StorageResult<Option<FileInfo>> {
        Ok(self.retrieve(id).await?.map(|item| item.file_info()))
    }

    /// Read metadata for several records at once.
    ///
    /// Default implementation runs `file_info()` for every id concurrently.
    async fn file_info_multiple(
        &self,
        ids: &[String],
    ) -> StorageResult<HashMap<String, Option<FileInfo>>> {
        let lookups = ids.iter().map(|id| async move {
            let info = self.file_info(id).await?;
            Ok::<_, StorageError>((id.clone(), info))
        });
        join_all(lookups).await.into_iter().collect()
    }

    /// Enumerate stored ids, optionally restricted to those starting with
    /// `prefix`.
    ///
    /// Each call starts a fresh enumeration. Order is unspecified.
    fn all_file_ids(&self, prefix: Option<&str>) -> FileIdStream;
}
