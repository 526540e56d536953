use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use cstore_core::{
    stream_to_bytes, ByteStream, ContentItem, ContentStorage, Encoding, FileIdStream, FileInfo,
    StorageError, StorageResult,
};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::client::{ObjectHead, ObjectStoreClient};
use crate::config::S3Config;
use crate::s3::S3Client;

/// [`ContentStorage`] on an S3-compatible object store.
///
/// Each record is one object under `<key_prefix>/<id>`. Nothing is compressed
/// locally; an object uploaded with `Content-Encoding: gzip` is reported as
/// gzip-encoded and decoded on read.
pub struct S3ContentStorage {
    client: Arc<dyn ObjectStoreClient>,
    key_prefix: Option<String>,
}

impl S3ContentStorage {
    pub fn new(client: Arc<dyn ObjectStoreClient>, key_prefix: Option<String>) -> Self {
        let key_prefix = key_prefix
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty());
        Self { client, key_prefix }
    }

    /// Connect to the bucket described by `config`.
    pub fn from_config(config: &S3Config) -> StorageResult<Self> {
        let client = S3Client::new(config)?;
        info!(
            bucket = %config.bucket,
            endpoint = %config.endpoint,
            key_prefix = ?config.key_prefix,
            "opened s3 content storage"
        );
        Ok(Self::new(Arc::new(client), config.key_prefix.clone()))
    }

    fn key(&self, id: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{prefix}/{id}"),
            None => id.to_string(),
        }
    }

    async fn head(&self, id: &str) -> Option<ObjectHead> {
        match self.client.head_object(&self.key(id)).await {
            Ok(head) => head,
            Err(e) => {
                warn!(id, error = %e, "head request failed; reporting record as absent");
                None
            }
        }
    }
}

fn file_info(head: &ObjectHead) -> FileInfo {
    FileInfo {
        size: head.content_length,
        encoding: head
            .content_encoding
            .as_deref()
            .and_then(Encoding::from_content_encoding),
    }
}

#[async_trait]
impl ContentStorage for S3ContentStorage {
    async fn store_stream(&self, id: &str, content: ByteStream) -> StorageResult<()> {
        let body = stream_to_bytes(content).await?;
        let size = body.len();
        self.client.put_object(&self.key(id), body).await?;
        debug!(id, size, "stored");
        Ok(())
    }

    async fn store_stream_and_compress(&self, id: &str, content: ByteStream) -> StorageResult<()> {
        self.store_stream(id, content).await
    }

    async fn retrieve(&self, id: &str) -> StorageResult<Option<ContentItem>> {
        let Some(head) = self.head(id).await else {
            return Ok(None);
        };
        let info = file_info(&head);
        let client = self.client.clone();
        let key = self.key(id);
        Ok(Some(ContentItem::new(
            move || {
                let client = client.clone();
                let key = key.clone();
                async move {
                    client.get_object(&key).await?.ok_or_else(|| {
                        StorageError::Io(io::Error::new(
                            io::ErrorKind::NotFound,
                            format!("object {key} disappeared"),
                        ))
                    })
                }
            },
            info.size,
            info.encoding,
        )))
    }

    async fn exist(&self, id: &str) -> StorageResult<bool> {
        Ok(self.head(id).await.is_some())
    }

    async fn delete(&self, ids: &[String]) -> StorageResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = ids.iter().map(|id| self.key(id)).collect();
        self.client.delete_objects(&keys).await?;
        debug!(count = keys.len(), "deleted");
        Ok(())
    }

    async fn file_info(&self, id: &str) -> StorageResult<Option<FileInfo>> {
        Ok(self.head(id).await.as_ref().map(file_info))
    }

    fn all_file_ids(&self, prefix: Option<&str>) -> FileIdStream {
        let strip = self.key_prefix.as_ref().map(|p| format!("{p}/"));
        let list_prefix = match (&strip, prefix) {
            (Some(strip), Some(prefix)) => Some(format!("{strip}{prefix}")),
            (Some(strip), None) => Some(strip.clone()),
            (None, prefix) => prefix.map(str::to_owned),
        };
        let listing = Listing {
            client: self.client.clone(),
            list_prefix,
            strip,
            buffered: VecDeque::new(),
            continuation_token: None,
            exhausted: false,
        };
        stream::unfold(listing, |mut listing| async move {
            let id = listing.next_id().await?;
            Some((id, listing))
        })
        .boxed()
    }
}

impl std::fmt::Debug for S3ContentStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ContentStorage")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

/// Paging state of one `all_file_ids` enumeration.
struct Listing {
    client: Arc<dyn ObjectStoreClient>,
    list_prefix: Option<String>,
    strip: Option<String>,
    buffered: VecDeque<String>,
    continuation_token: Option<String>,
    exhausted: bool,
}

impl Listing {
    async fn next_id(&mut self) -> Option<String> {
        loop {
            if let Some(key) = self.buffered.pop_front() {
                let id = match &self.strip {
                    Some(strip) => key.strip_prefix(strip.as_str()).map(str::to_owned),
                    None => Some(key),
                };
                match id {
                    Some(id) if !id.is_empty() => return Some(id),
                    _ => continue,
                }
            }
            if self.exhausted {
                return None;
            }

            let page = self
                .client
                .list_objects(self.list_prefix.as_deref(), self.continuation_token.as_deref())
                .await;
            match page {
                Ok(page) => {
                    self.buffered.extend(page.keys);
                    self.continuation_token = page.next_continuation_token;
                    self.exhausted = self.continuation_token.is_none();
                }
                Err(e) => {
                    warn!(error = %e, "object listing failed; ending enumeration");
                    self.exhausted = true;
                }
            }
        }
    }
}
