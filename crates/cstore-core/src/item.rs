use std::future::Future;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::Arc;

use async_compression::tokio::bufread::GzipDecoder;
use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

use crate::error::{StorageError, StorageResult};
use crate::types::{Encoding, FileInfo};

/// An owned, sendable byte stream.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

type StreamFactory = Arc<dyn Fn() -> BoxFuture<'static, StorageResult<ByteStream>> + Send + Sync>;

/// A record handed out by [`ContentStorage::retrieve`](crate::ContentStorage::retrieve).
///
/// The item does not hold an open stream. It holds a factory that opens one
/// on demand, so every call to [`as_stream`](Self::as_stream) or
/// [`as_raw_stream`](Self::as_raw_stream) reads the record from the start,
/// independently of earlier calls.
///
/// `size` and `encoding` are captured at lookup time and describe the stored
/// representation, not the decoded payload.
#[derive(Clone)]
pub struct ContentItem {
    factory: StreamFactory,
    size: Option<u64>,
    encoding: Option<Encoding>,
}

impl ContentItem {
    /// Create an item from a stream-opening function.
    pub fn new<F, Fut>(factory: F, size: Option<u64>, encoding: Option<Encoding>) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StorageResult<ByteStream>> + Send + 'static,
    {
        Self {
            factory: Arc::new(move || Box::pin(factory())),
            size,
            encoding,
        }
    }

    /// Create a plain item over an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let size = Some(bytes.len() as u64);
        Self::new(
            move || {
                let bytes = bytes.clone();
                async move { Ok::<_, StorageError>(bytes_to_stream(bytes)) }
            },
            size,
            None,
        )
    }

    /// Size of the stored representation in bytes, if known.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Encoding of the stored representation; `None` means plain.
    pub fn encoding(&self) -> Option<Encoding> {
        self.encoding
    }

    /// The item's metadata as a [`FileInfo`].
    pub fn file_info(&self) -> FileInfo {
        FileInfo {
            size: self.size,
            encoding: self.encoding,
        }
    }

    /// Open the logical payload, decoding it if it is stored compressed.
    pub async fn as_stream(&self) -> StorageResult<ByteStream> {
        let raw = (self.factory)().await?;
        match self.encoding {
            Some(Encoding::Gzip) => {
                let mut decoder = GzipDecoder::new(BufReader::new(raw));
                decoder.multiple_members(true);
                Ok(Box::pin(decoder))
            }
            None => Ok(raw),
        }
    }

    /// Open the stored bytes exactly as persisted.
    ///
    /// Callers must interpret [`encoding`](Self::encoding) themselves.
    pub async fn as_raw_stream(&self) -> StorageResult<ByteStream> {
        (self.factory)().await
    }
}

impl std::fmt::Debug for ContentItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentItem")
            .field("size", &self.size)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

/// Wrap a buffer in a [`ByteStream`].
pub fn bytes_to_stream(bytes: impl Into<Bytes>) -> ByteStream {
    Box::pin(Cursor::new(bytes.into()))
}

/// Drain a stream into a single buffer.
pub async fn stream_to_bytes<R>(mut stream: R) -> std::io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}
