//! The filesystem capability the folder backend runs on.
//!
//! Every component of this crate receives an `Arc<dyn FileSystem>` instead of
//! calling `tokio::fs` directly, so tests can substitute a failing or
//! instrumented implementation.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use cstore_core::ByteStream;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::AsyncWrite;
use tracing::debug;

/// An owned, sendable byte sink.
pub type WriteStream = Pin<Box<dyn AsyncWrite + Send>>;

/// Lazily produced entries of one directory.
pub type DirEntryStream = BoxStream<'static, io::Result<DirEntryInfo>>;

/// The subset of file metadata the storage needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileMeta {
    pub len: u64,
    pub is_dir: bool,
}

/// One entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Asynchronous filesystem operations.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Open a file for reading.
    async fn open_read(&self, path: &Path) -> io::Result<ByteStream>;

    /// Create (or truncate) a file for writing.
    async fn create_write(&self, path: &Path) -> io::Result<WriteStream>;

    /// Stat a path, following symlinks.
    async fn metadata(&self, path: &Path) -> io::Result<FileMeta>;

    /// Remove a single file.
    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Create a directory and all missing parents.
    ///
    /// Must succeed if the directory already exists, including when another
    /// caller creates it concurrently.
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// List a directory lazily.
    async fn read_dir(&self, path: &Path) -> io::Result<DirEntryStream>;
}

/// [`FileSystem`] backed by `tokio::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn open_read(&self, path: &Path) -> io::Result<ByteStream> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::pin(file))
    }

    async fn create_write(&self, path: &Path) -> io::Result<WriteStream> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Box::pin(file))
    }

    async fn metadata(&self, path: &Path) -> io::Result<FileMeta> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(FileMeta {
            len: meta.len(),
            is_dir: meta.is_dir(),
        })
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::create_dir_all(path).await {
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            other => other,
        }
    }

    async fn read_dir(&self, path: &Path) -> io::Result<DirEntryStream> {
        let entries = tokio::fs::read_dir(path).await?;
        let listing = stream::unfold(Some(entries), |state| async move {
            let mut entries = state?;
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let item = entry.file_type().await.map(|kind| DirEntryInfo {
                        path: entry.path(),
                        is_dir: kind.is_dir(),
                    });
                    Some((item, Some(entries)))
                }
                Ok(None) => None,
                // Stop after the first error so a broken listing cannot spin.
                Err(e) => Some((Err(e), None)),
            }
        });
        Ok(listing.boxed())
    }
}

/// Remove `path`, logging and swallowing any failure.
///
/// Used for cleanup whose failure must not fail the caller's operation. A
/// missing file is the expected case and is not logged.
pub async fn best_effort_remove(fs: &dyn FileSystem, path: &Path) {
    match fs.remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!(path = %path.display(), error = %e, "best-effort remove failed"),
    }
}
