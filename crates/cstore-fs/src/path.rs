use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use cstore_core::{StorageError, StorageResult};
use sha1::{Digest, Sha1};

use crate::config::FolderStorageOptions;
use crate::fs::FileSystem;

/// Number of hex characters of `sha1(id)` used as the shard directory name.
///
/// Four characters spread ids over 16^4 directories, which keeps directory
/// sizes manageable for stores holding millions of records.
pub const SHARD_LEN: usize = 4;

/// Shard directory name for `id`.
pub fn shard_of(id: &str) -> String {
    let digest = Sha1::digest(id.as_bytes());
    let mut shard = hex::encode(digest);
    shard.truncate(SHARD_LEN);
    shard
}

/// Lexically normalize a path: drop `.` and resolve `..` against preceding
/// components. Never touches the filesystem.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `..` at the filesystem root stays at the root.
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Maps logical ids to physical paths below the storage root.
///
/// Layout is `root/<shard>/<id>`, or `root/<id>` when sharding is disabled.
/// An id may contain `/`, in which case it maps to nested directories below
/// the shard. An id whose normalized path leaves its shard directory (or the
/// root, when flat) is rejected with [`StorageError::PathTraversal`].
pub struct PathResolver {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    sharded: bool,
}

impl PathResolver {
    /// Create a resolver for `root`. The root is normalized, which also
    /// strips trailing separators.
    pub fn new(fs: Arc<dyn FileSystem>, root: impl AsRef<Path>, options: &FolderStorageOptions) -> Self {
        Self {
            fs,
            root: normalize(root.as_ref()),
            sharded: !options.disable_prefix_hash,
        }
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether ids are spread over shard directories.
    pub fn is_sharded(&self) -> bool {
        self.sharded
    }

    /// Compute the physical path of `id` without touching the filesystem.
    pub fn locate(&self, id: &str) -> StorageResult<PathBuf> {
        let base = if self.sharded {
            self.root.join(shard_of(id))
        } else {
            self.root.clone()
        };
        let path = normalize(&base.join(id));
        if path == base || !path.starts_with(&base) {
            return Err(StorageError::PathTraversal { id: id.to_string() });
        }
        Ok(path)
    }

    /// Compute the physical path of `id` and make sure its directory exists.
    pub async fn resolve(&self, id: &str) -> StorageResult<PathBuf> {
        let path = self.locate(id)?;
        if let Some(parent) = path.parent() {
            self.fs.create_dir_all(parent).await?;
        }
        Ok(path)
    }
}

impl std::fmt::Debug for PathResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathResolver")
            .field("root", &self.root)
            .field("sharded", &self.sharded)
            .finish()
    }
}
