use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cstore_core::{ContentItem, Encoding, FileInfo, StorageError, StorageResult};
use tracing::warn;

use crate::compression::compressed_path;
use crate::fs::FileSystem;
use crate::path::PathResolver;

/// The physical file currently backing a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Located {
    pub path: PathBuf,
    pub info: FileInfo,
}

/// Finds which representation of a record exists on disk.
///
/// The compressed file is checked first, then the plain one. A record is
/// never kept in both forms, except transiently while a compressed store
/// is replacing its plain original; during that window the compressed copy
/// wins.
pub struct EncodingProbe {
    fs: Arc<dyn FileSystem>,
    resolver: Arc<PathResolver>,
}

impl EncodingProbe {
    pub fn new(fs: Arc<dyn FileSystem>, resolver: Arc<PathResolver>) -> Self {
        Self { fs, resolver }
    }

    /// Locate the representation of `id`, propagating every failure except
    /// "not found".
    pub async fn locate(&self, id: &str) -> StorageResult<Option<Located>> {
        let path = self.resolver.resolve(id).await?;
        let candidates = [
            (compressed_path(&path), Some(Encoding::Gzip)),
            (path, None),
        ];
        for (path, encoding) in candidates {
            if let Some(size) = self.file_size(&path).await? {
                return Ok(Some(Located {
                    path,
                    info: FileInfo {
                        size: Some(size),
                        encoding,
                    },
                }));
            }
        }
        Ok(None)
    }

    /// Metadata of `id`, or `None` if it is absent.
    ///
    /// Any failure is logged and reported as absent.
    pub async fn probe(&self, id: &str) -> Option<FileInfo> {
        self.locate_or_log(id).await.map(|located| located.info)
    }

    /// A lazily opened [`ContentItem`] for `id`, or `None` if it is absent.
    ///
    /// Any failure is logged and reported as absent.
    pub async fn open(&self, id: &str) -> Option<ContentItem> {
        let Located { path, info } = self.locate_or_log(id).await?;
        let fs = self.fs.clone();
        Some(ContentItem::new(
            move || {
                let fs = fs.clone();
                let path = path.clone();
                async move { fs.open_read(&path).await.map_err(StorageError::from) }
            },
            info.size,
            info.encoding,
        ))
    }

    async fn locate_or_log(&self, id: &str) -> Option<Located> {
        match self.locate(id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(id, error = %e, "lookup failed; reporting record as absent");
                None
            }
        }
    }

    /// Size of the regular file at `path`; `None` if nothing (or a
    /// directory) is there.
    async fn file_size(&self, path: &Path) -> io::Result<Option<u64>> {
        match self.fs.metadata(path).await {
            Ok(meta) if meta.is_dir => Ok(None),
            Ok(meta) => Ok(Some(meta.len)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}
