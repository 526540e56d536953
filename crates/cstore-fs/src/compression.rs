use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cstore_core::{StorageError, StorageResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::fs::{best_effort_remove, FileSystem};
use crate::path::normalize;

/// Suffix appended to the physical path of a gzip-encoded record.
pub const COMPRESSED_SUFFIX: &str = ".gzip";

/// A compressed copy is kept only if `compressed * MIN_GAIN_RATIO <= original`,
/// i.e. it saves at least ~10%. Smaller gains are not worth decompressing on
/// every read.
pub const MIN_GAIN_RATIO: f64 = 1.1;

const CHUNK_SIZE: usize = 64 * 1024;

/// Sizes reported by a compression that was kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompressionResult {
    pub original_size: u64,
    pub compressed_size: u64,
}

/// Physical path of the compressed representation of `path`.
pub fn compressed_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(COMPRESSED_SUFFIX);
    PathBuf::from(name)
}

fn worth_keeping(original_size: u64, compressed_size: u64) -> bool {
    compressed_size as f64 * MIN_GAIN_RATIO <= original_size as f64
}

fn same_file(a: &Path, b: &Path) -> io::Result<bool> {
    Ok(normalize(&std::path::absolute(a)?) == normalize(&std::path::absolute(b)?))
}

/// Gzip-compresses stored files next to their originals.
///
/// The compressor never deletes the original file. Deciding which copy is
/// canonical is up to the caller.
pub struct Compressor {
    fs: Arc<dyn FileSystem>,
}

impl Compressor {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Compress `path` into `path` + [`COMPRESSED_SUFFIX`].
    pub async fn compress(&self, path: &Path) -> StorageResult<Option<CompressionResult>> {
        self.compress_file(path, &compressed_path(path)).await
    }

    /// Compress `input` into `output`.
    ///
    /// Returns `Ok(None)` and removes `output` when the gain is below
    /// [`MIN_GAIN_RATIO`]. Fails with [`StorageError::CompressIntoSelf`] if
    /// both paths name the same file.
    pub async fn compress_file(
        &self,
        input: &Path,
        output: &Path,
    ) -> StorageResult<Option<CompressionResult>> {
        if same_file(input, output)? {
            return Err(StorageError::CompressIntoSelf {
                path: input.to_path_buf(),
            });
        }

        if let Err(e) = self.gzip_into(input, output).await {
            best_effort_remove(self.fs.as_ref(), output).await;
            return Err(e.into());
        }

        let original_size = self.fs.metadata(input).await?.len;
        let compressed_size = self.fs.metadata(output).await?.len;

        if !worth_keeping(original_size, compressed_size) {
            debug!(
                path = %input.display(),
                original_size,
                compressed_size,
                "compression gain too small; discarding"
            );
            best_effort_remove(self.fs.as_ref(), output).await;
            return Ok(None);
        }

        debug!(path = %input.display(), original_size, compressed_size, "compressed");
        Ok(Some(CompressionResult {
            original_size,
            compressed_size,
        }))
    }

    async fn gzip_into(&self, input: &Path, output: &Path) -> io::Result<()> {
        let mut source = self.fs.open_read(input).await?;
        let mut sink = self.fs.create_write(output).await?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            encoder.write_all(&buf[..n])?;
            let pending = encoder.get_mut();
            if !pending.is_empty() {
                sink.write_all(pending).await?;
                pending.clear();
            }
        }

        let tail = encoder.finish()?;
        sink.write_all(&tail).await?;
        sink.shutdown().await?;
        Ok(())
    }
}
