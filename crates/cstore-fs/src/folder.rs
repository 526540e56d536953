use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cstore_core::{
    ByteStream, ContentItem, ContentStorage, Encoding, FileIdStream, FileInfo, StorageResult,
};
use futures::future::join_all;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::compression::{compressed_path, Compressor};
use crate::config::FolderStorageOptions;
use crate::fs::{best_effort_remove, FileSystem, LocalFileSystem};
use crate::path::PathResolver;
use crate::probe::EncodingProbe;
use crate::walker::DirectoryWalker;

/// [`ContentStorage`] on a local directory tree.
///
/// Records live at `root/<shard>/<id>` (plain) or `root/<shard>/<id>.gzip`
/// (gzip-encoded). Reads prefer the compressed file.
///
/// # Concurrency
///
/// There are no per-id locks. Concurrent writers to the same id race and the
/// last one to finish wins. While `store_stream_and_compress` replaces a
/// plain file, both representations exist briefly; readers see the
/// compressed one.
///
/// Deleting a nested id such as `f/b/c/3` removes only its files. The
/// directories created for it stay in place; they never show up as ids and
/// are reused by later stores.
pub struct FolderContentStorage {
    fs: Arc<dyn FileSystem>,
    resolver: Arc<PathResolver>,
    probe: EncodingProbe,
    compressor: Compressor,
    walker: DirectoryWalker,
}

impl FolderContentStorage {
    /// Open (and create if needed) a storage rooted at `root` on the local
    /// filesystem.
    pub async fn new(root: impl AsRef<Path>, options: FolderStorageOptions) -> StorageResult<Self> {
        Self::with_file_system(Arc::new(LocalFileSystem), root, options).await
    }

    /// Open a storage on an arbitrary [`FileSystem`].
    pub async fn with_file_system(
        fs: Arc<dyn FileSystem>,
        root: impl AsRef<Path>,
        options: FolderStorageOptions,
    ) -> StorageResult<Self> {
        let resolver = Arc::new(PathResolver::new(fs.clone(), root, &options));
        fs.create_dir_all(resolver.root()).await?;
        info!(
            root = %resolver.root().display(),
            sharded = resolver.is_sharded(),
            "opened folder content storage"
        );

        Ok(Self {
            probe: EncodingProbe::new(fs.clone(), resolver.clone()),
            compressor: Compressor::new(fs.clone()),
            walker: DirectoryWalker::new(fs.clone(), resolver.root().to_path_buf(), resolver.is_sharded()),
            resolver,
            fs,
        })
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    /// Copy `content` into a fresh file at `path`. A failed copy removes the
    /// partial file.
    async fn write(&self, path: &Path, mut content: ByteStream) -> StorageResult<u64> {
        let copied = async {
            let mut sink = self.fs.create_write(path).await?;
            let written = tokio::io::copy(&mut content, &mut sink).await?;
            sink.shutdown().await?;
            Ok::<_, io::Error>(written)
        }
        .await;

        match copied {
            Ok(written) => Ok(written),
            Err(e) => {
                best_effort_remove(self.fs.as_ref(), path).await;
                Err(e.into())
            }
        }
    }

    /// Remove `path`; a missing file is not an error.
    async fn remove_if_present(&self, path: &Path) -> io::Result<()> {
        match self.fs.remove_file(path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ContentStorage for FolderContentStorage {
    async fn store_stream(&self, id: &str, content: ByteStream) -> StorageResult<()> {
        let path = self.resolver.resolve(id).await?;
        // A compressed copy from an earlier store would shadow this one.
        self.remove_if_present(&compressed_path(&path)).await?;
        let written = self.write(&path, content).await?;
        debug!(id, size = written, "stored");
        Ok(())
    }

    async fn store_stream_and_compress(&self, id: &str, content: ByteStream) -> StorageResult<()> {
        let path = self.resolver.resolve(id).await?;
        let written = self.write(&path, content).await?;

        match self.compressor.compress(&path).await {
            Ok(Some(result)) => {
                let info = self.probe.probe(id).await;
                if info.and_then(|info| info.encoding) == Some(Encoding::Gzip) {
                    best_effort_remove(self.fs.as_ref(), &path).await;
                }
                debug!(
                    id,
                    original_size = result.original_size,
                    compressed_size = result.compressed_size,
                    "stored compressed"
                );
            }
            Ok(None) => debug!(id, size = written, "stored plain; compression not worth it"),
            Err(e) => {
                warn!(id, error = %e, "compression failed; keeping plain copy");
                best_effort_remove(self.fs.as_ref(), &compressed_path(&path)).await;
            }
        }
        Ok(())
    }

    async fn retrieve(&self, id: &str) -> StorageResult<Option<ContentItem>> {
        Ok(self.probe.open(id).await)
    }

    async fn exist(&self, id: &str) -> StorageResult<bool> {
        Ok(self.probe.probe(id).await.is_some())
    }

    async fn delete(&self, ids: &[String]) -> StorageResult<()> {
        let paths = ids
            .iter()
            .map(|id| self.resolver.locate(id))
            .collect::<StorageResult<Vec<_>>>()?;

        let removals = ids.iter().zip(paths).map(|(id, path)| async move {
            best_effort_remove(self.fs.as_ref(), &compressed_path(&path)).await;
            best_effort_remove(self.fs.as_ref(), &path).await;
            debug!(id = %id, "deleted");
        });
        join_all(removals).await;
        Ok(())
    }

    async fn file_info(&self, id: &str) -> StorageResult<Option<FileInfo>> {
        Ok(self.probe.probe(id).await)
    }

    fn all_file_ids(&self, prefix: Option<&str>) -> FileIdStream {
        self.walker.walk(prefix)
    }
}

impl std::fmt::Debug for FolderContentStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderContentStorage")
            .field("root", &self.resolver.root())
            .field("sharded", &self.resolver.is_sharded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{DirEntryStream, FileMeta, WriteStream};
    use cstore_core::{bytes_to_stream, stream_to_bytes, StorageError};
    use futures::StreamExt;
    use proptest::prelude::*;

    async fn open(root: &Path) -> FolderContentStorage {
        FolderContentStorage::new(root, FolderStorageOptions::default())
            .await
            .unwrap()
    }

    async fn read(storage: &FolderContentStorage, id: &str) -> Vec<u8> {
        let item = storage.retrieve(id).await.unwrap().expect("record exists");
        stream_to_bytes(item.as_stream().await.unwrap()).await.unwrap().to_vec()
    }

    async fn sorted_ids(storage: &FolderContentStorage, prefix: Option<&str>) -> Vec<String> {
        let mut ids: Vec<String> = storage.all_file_ids(prefix).collect().await;
        ids.sort();
        ids
    }

    fn flat() -> FolderStorageOptions {
        FolderStorageOptions {
            disable_prefix_hash: true,
        }
    }

    /// Local disk where `.gzip` files cannot be unlinked.
    struct PinnedGzip;

    #[async_trait]
    impl FileSystem for PinnedGzip {
        async fn open_read(&self, path: &Path) -> io::Result<ByteStream> {
            LocalFileSystem.open_read(path).await
        }

        async fn create_write(&self, path: &Path) -> io::Result<WriteStream> {
            LocalFileSystem.create_write(path).await
        }

        async fn metadata(&self, path: &Path) -> io::Result<FileMeta> {
            LocalFileSystem.metadata(path).await
        }

        async fn remove_file(&self, path: &Path) -> io::Result<()> {
            if path.extension().is_some_and(|ext| ext == "gzip") {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "pinned"));
            }
            LocalFileSystem.remove_file(path).await
        }

        async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            LocalFileSystem.create_dir_all(path).await
        }

        async fn read_dir(&self, path: &Path) -> io::Result<DirEntryStream> {
            LocalFileSystem.read_dir(path).await
        }
    }

    // ------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn constructor_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a").join("contents");
        let storage = open(&root).await;
        assert!(root.is_dir());
        assert_eq!(storage.root(), root.as_path());
    }

    #[tokio::test]
    async fn records_land_in_shard_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path()).await;

        storage.store_stream("some-id", bytes_to_stream("123")).await.unwrap();
        storage.store_stream("another-id", bytes_to_stream("456")).await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("9584/some-id")).unwrap(), b"123");
        assert_eq!(std::fs::read(dir.path().join("ea6c/another-id")).unwrap(), b"456");
    }

    #[tokio::test]
    async fn flat_layout_without_prefix_hash() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FolderContentStorage::new(
            dir.path(),
            FolderStorageOptions {
                disable_prefix_hash: true,
            },
        )
        .await
        .unwrap();

        storage.store_stream("some-id", bytes_to_stream("123")).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("some-id")).unwrap(), b"123");
        assert_eq!(sorted_ids(&storage, None).await, vec!["some-id"]);
    }

    // ------------------------------------------------------------------
    // Store / retrieve
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path()).await;

        storage.store_stream("some-id", bytes_to_stream("123")).await.unwrap();
        assert_eq!(read(&storage, "some-id").await, b"123");
        assert!(storage.exist("some-id").await.unwrap());
        assert!(storage.retrieve("missing").await.unwrap().is_none());
        assert!(!storage.exist("missing").await.unwrap());
    }

    #[tokio::test]
    async fn overwrite_replaces_payload() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path()).await;

        storage.store_stream("some-id", bytes_to_stream("first payload")).await.unwrap();
        storage.store_stream("some-id", bytes_to_stream("second")).await.unwrap();
        assert_eq!(read(&storage, "some-id").await, b"second");
    }

    #[tokio::test]
    async fn file_info_of_plain_record() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path()).await;

        storage.store_stream("some-id", bytes_to_stream("123")).await.unwrap();
        assert_eq!(
            storage.file_info("some-id").await.unwrap(),
            Some(FileInfo {
                size: Some(3),
                encoding: None
            })
        );
        assert_eq!(storage.file_info("missing").await.unwrap(), None);
    }

    // ------------------------------------------------------------------
    // Compression
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn compressible_payload_is_kept_gzipped() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path()).await;
        let zeros = vec![0u8; 10_000];

        storage
            .store_stream_and_compress("some-id", bytes_to_stream(zeros.clone()))
            .await
            .unwrap();

        assert_eq!(
            storage.file_info("some-id").await.unwrap(),
            Some(FileInfo {
                size: Some(45),
                encoding: Some(Encoding::Gzip)
            })
        );
        assert!(dir.path().join("9584/some-id.gzip").exists());
        assert!(!dir.path().join("9584/some-id").exists());
        assert_eq!(read(&storage, "some-id").await, zeros);
    }

    #[tokio::test]
    async fn raw_stream_matches_reported_size() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path()).await;

        storage
            .store_stream_and_compress("some-id", bytes_to_stream(vec![0u8; 10_000]))
            .await
            .unwrap();

        let item = storage.retrieve("some-id").await.unwrap().unwrap();
        let raw = stream_to_bytes(item.as_raw_stream().await.unwrap()).await.unwrap();
        assert_eq!(Some(raw.len() as u64), item.size());
    }

    #[tokio::test]
    async fn incompressible_payload_stays_plain() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path()).await;

        storage
            .store_stream_and_compress("some-id", bytes_to_stream("123"))
            .await
            .unwrap();

        let item = storage.retrieve("some-id").await.unwrap().unwrap();
        assert_eq!(item.encoding(), None);
        assert_eq!(item.size(), Some(3));
        assert!(!dir.path().join("9584/some-id.gzip").exists());
        assert_eq!(read(&storage, "some-id").await, b"123");
    }

    #[tokio::test]
    async fn plain_store_replaces_compressed_record() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path()).await;

        storage
            .store_stream_and_compress("some-id", bytes_to_stream(vec![0u8; 10_000]))
            .await
            .unwrap();
        storage.store_stream("some-id", bytes_to_stream("123")).await.unwrap();

        assert!(!dir.path().join("9584/some-id.gzip").exists());
        assert_eq!(read(&storage, "some-id").await, b"123");
    }

    #[tokio::test]
    async fn plain_store_fails_when_compressed_record_cannot_be_removed() {
        let dir = tempfile::tempdir().unwrap();
        let zeros = vec![0u8; 10_000];
        open(dir.path())
            .await
            .store_stream_and_compress("some-id", bytes_to_stream(zeros.clone()))
            .await
            .unwrap();

        let storage = FolderContentStorage::with_file_system(
            Arc::new(PinnedGzip),
            dir.path(),
            FolderStorageOptions::default(),
        )
        .await
        .unwrap();
        let err = storage
            .store_stream("some-id", bytes_to_stream("second"))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Io(_)));
        assert!(!dir.path().join("9584/some-id").exists());
        assert_eq!(read(&storage, "some-id").await, zeros);
    }

    #[tokio::test]
    async fn incompressible_store_replaces_compressed_record() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path()).await;

        storage
            .store_stream_and_compress("some-id", bytes_to_stream(vec![0u8; 10_000]))
            .await
            .unwrap();
        storage
            .store_stream_and_compress("some-id", bytes_to_stream("123"))
            .await
            .unwrap();

        assert!(!dir.path().join("9584/some-id.gzip").exists());
        assert_eq!(read(&storage, "some-id").await, b"123");
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn delete_removes_every_representation() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path()).await;

        storage
            .store_stream_and_compress("some-id", bytes_to_stream(vec![0u8; 10_000]))
            .await
            .unwrap();
        storage.store_stream("another-id", bytes_to_stream("123")).await.unwrap();
        // Leave both representations on disk, as after an interrupted store.
        std::fs::write(dir.path().join("9584/some-id"), b"stale").unwrap();

        storage
            .delete(&["some-id".to_string(), "another-id".to_string(), "missing".to_string()])
            .await
            .unwrap();

        assert!(!storage.exist("some-id").await.unwrap());
        assert!(!storage.exist("another-id").await.unwrap());
        assert!(!dir.path().join("9584/some-id").exists());
        assert!(!dir.path().join("9584/some-id.gzip").exists());
        assert!(!dir.path().join("ea6c/another-id").exists());
    }

    #[tokio::test]
    async fn failed_unlink_does_not_abort_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FolderContentStorage::new(dir.path(), flat()).await.unwrap();

        storage.store_stream("f/a", bytes_to_stream("nested")).await.unwrap();
        storage.store_stream("other", bytes_to_stream("123")).await.unwrap();

        // `f` resolves to a directory, which cannot be unlinked as a file.
        storage
            .delete(&["f".to_string(), "other".to_string()])
            .await
            .unwrap();

        assert!(!storage.exist("other").await.unwrap());
        assert!(!dir.path().join("other").exists());
        assert_eq!(read(&storage, "f/a").await, b"nested");
    }

    #[tokio::test]
    async fn delete_with_pinned_compressed_copy_still_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        open(dir.path())
            .await
            .store_stream_and_compress("some-id", bytes_to_stream(vec![0u8; 10_000]))
            .await
            .unwrap();

        let storage = FolderContentStorage::with_file_system(
            Arc::new(PinnedGzip),
            dir.path(),
            FolderStorageOptions::default(),
        )
        .await
        .unwrap();
        storage.store_stream("another-id", bytes_to_stream("123")).await.unwrap();
        storage
            .delete(&["some-id".to_string(), "another-id".to_string()])
            .await
            .unwrap();

        assert!(!storage.exist("another-id").await.unwrap());
        assert!(dir.path().join("9584/some-id.gzip").exists());
    }

    #[tokio::test]
    async fn traversal_in_batch_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path()).await;
        storage.store_stream("some-id", bytes_to_stream("123")).await.unwrap();

        let err = storage
            .delete(&["some-id".to_string(), "../x".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::PathTraversal { .. }));
        assert!(storage.exist("some-id").await.unwrap());
    }

    #[tokio::test]
    async fn nested_delete_keeps_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FolderContentStorage::new(dir.path(), flat()).await.unwrap();

        storage.store_stream("f/b/c/3", bytes_to_stream("3")).await.unwrap();
        storage.delete(&["f/b/c/3".to_string()]).await.unwrap();

        assert!(dir.path().join("f/b/c").is_dir());
        assert!(!dir.path().join("f/b/c/3").exists());
        assert!(sorted_ids(&storage, None).await.is_empty());

        storage.store_stream("f/b/c/3", bytes_to_stream("again")).await.unwrap();
        assert_eq!(read(&storage, "f/b/c/3").await, b"again");
    }

    #[tokio::test]
    async fn delete_of_nothing_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path()).await;
        storage.delete(&[]).await.unwrap();
    }

    // ------------------------------------------------------------------
    // Path safety
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn traversal_cannot_read_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("contents");
        let storage = open(&root).await;
        std::fs::write(dir.path().join("some-id"), b"secret").unwrap();

        assert!(storage.retrieve("../some-id").await.unwrap().is_none());
        assert!(!storage.exist("../some-id").await.unwrap());
        assert_eq!(storage.file_info("../some-id").await.unwrap(), None);
    }

    #[tokio::test]
    async fn traversal_is_rejected_on_write_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("contents");
        let storage = open(&root).await;

        let err = storage
            .store_stream("../../escape", bytes_to_stream("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PathTraversal { .. }));
        assert!(!dir.path().join("escape").exists());

        let err = storage.delete(&["../x".to_string()]).await.unwrap_err();
        assert!(matches!(err, StorageError::PathTraversal { .. }));
    }

    // ------------------------------------------------------------------
    // Enumeration
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn enumerates_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path()).await;

        storage.store_stream("some-id", bytes_to_stream("123")).await.unwrap();
        storage
            .store_stream_and_compress("another-id", bytes_to_stream(vec![0u8; 10_000]))
            .await
            .unwrap();

        assert_eq!(sorted_ids(&storage, Some("an")).await, vec!["another-id"]);
        assert_eq!(sorted_ids(&storage, Some("so")).await, vec!["some-id"]);
        assert_eq!(
            sorted_ids(&storage, None).await,
            vec!["another-id", "some-id"]
        );
    }

    #[tokio::test]
    async fn enumerates_nested_ids() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path()).await;

        for id in ["a", "f/a", "f/b/c/3", "f/b/c/4"] {
            storage.store_stream(id, bytes_to_stream(id.to_string())).await.unwrap();
        }

        assert_eq!(
            sorted_ids(&storage, Some("f/")).await,
            vec!["f/a", "f/b/c/3", "f/b/c/4"]
        );
        assert_eq!(read(&storage, "f/b/c/3").await, b"f/b/c/3");
    }

    // ------------------------------------------------------------------
    // Failure handling
    // ------------------------------------------------------------------

    /// A reader that yields a few bytes and then fails.
    struct Broken {
        sent: bool,
    }

    impl tokio::io::AsyncRead for Broken {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            if self.sent {
                return std::task::Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "upstream went away",
                )));
            }
            self.sent = true;
            buf.put_slice(b"partial");
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn failed_write_leaves_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(dir.path()).await;

        let err = storage
            .store_stream("some-id", Box::pin(Broken { sent: false }))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(!storage.exist("some-id").await.unwrap());
        assert!(!dir.path().join("9584/some-id").exists());
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_round_trip(
            id in "[a-z0-9-]{1,12}(/[a-z0-9-]{1,8}){0,2}",
            payload in proptest::collection::vec(any::<u8>(), 0..2048),
            compress in any::<bool>(),
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let body = runtime.block_on(async {
                let dir = tempfile::tempdir().unwrap();
                let storage = open(dir.path()).await;
                if compress {
                    storage.store_stream_and_compress(&id, bytes_to_stream(payload.clone())).await.unwrap();
                } else {
                    storage.store_stream(&id, bytes_to_stream(payload.clone())).await.unwrap();
                }
                read(&storage, &id).await
            });
            prop_assert_eq!(body, payload);
        }

        #[test]
        fn prop_exist_multiple_matches_exist(
            stored in proptest::collection::btree_set("[a-z]{1,6}", 0..6),
            probed in proptest::collection::vec("[a-z]{1,6}", 0..8),
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let dir = tempfile::tempdir().unwrap();
                let storage = open(dir.path()).await;
                for id in &stored {
                    storage.store_stream(id, bytes_to_stream("x")).await.unwrap();
                }
                let batch = storage.exist_multiple(&probed).await.unwrap();
                for id in &probed {
                    assert_eq!(batch[id], storage.exist(id).await.unwrap());
                    assert_eq!(batch[id], stored.contains(id));
                }
            });
        }
    }
}
