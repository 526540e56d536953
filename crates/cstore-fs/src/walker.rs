use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use cstore_core::FileIdStream;
use futures::stream::{self, StreamExt};
use tracing::warn;

use crate::compression::COMPRESSED_SUFFIX;
use crate::fs::{DirEntryStream, FileSystem};

/// Enumerates record ids by walking the storage root.
///
/// This is the one place that maps physical file names back to ids: the
/// shard directory is dropped, the remaining path components are joined
/// with `/`, and the compression suffix is stripped.
pub struct DirectoryWalker {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    sharded: bool,
}

impl DirectoryWalker {
    pub fn new(fs: Arc<dyn FileSystem>, root: PathBuf, sharded: bool) -> Self {
        Self { fs, root, sharded }
    }

    /// Start a fresh walk yielding every id, or only those starting with
    /// `prefix`.
    ///
    /// The walk holds the pending directories and the listing of the current
    /// one, never the full id set. Unreadable directories are logged and
    /// skipped.
    pub fn walk(&self, prefix: Option<&str>) -> FileIdStream {
        let state = Walk {
            fs: self.fs.clone(),
            root: self.root.clone(),
            sharded: self.sharded,
            prefix: prefix.map(str::to_owned),
            pending: vec![self.root.clone()],
            current: None,
        };
        stream::unfold(state, |mut walk| async move {
            let id = walk.next_id().await?;
            Some((id, walk))
        })
        .boxed()
    }
}

/// Translate a physical file path into its id.
///
/// Returns `None` for files that cannot belong to a record: files outside the
/// root, stray files directly under a sharded root, and names that are not
/// valid UTF-8.
fn id_for_path(root: &Path, sharded: bool, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut components = relative.components();
    if sharded {
        components.next()?;
    }
    let mut parts = Vec::new();
    for component in components {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    let name = parts.join("/");
    Some(match name.strip_suffix(COMPRESSED_SUFFIX) {
        Some(stripped) => stripped.to_owned(),
        None => name,
    })
}

struct Walk {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    sharded: bool,
    prefix: Option<String>,
    pending: Vec<PathBuf>,
    current: Option<DirEntryStream>,
}

impl Walk {
    async fn next_id(&mut self) -> Option<String> {
        loop {
            let Some(listing) = self.current.as_mut() else {
                let dir = self.pending.pop()?;
                match self.fs.read_dir(&dir).await {
                    Ok(listing) => self.current = Some(listing),
                    Err(e) => warn!(dir = %dir.display(), error = %e, "cannot list directory; skipping"),
                }
                continue;
            };

            match listing.next().await {
                Some(Ok(entry)) if entry.is_dir => self.pending.push(entry.path),
                Some(Ok(entry)) => {
                    let Some(id) = id_for_path(&self.root, self.sharded, &entry.path) else {
                        continue;
                    };
                    if self.prefix.as_deref().map_or(true, |p| id.starts_with(p)) {
                        return Some(id);
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "directory listing failed; skipping rest of directory");
                    self.current = None;
                }
                None => self.current = None,
            }
        }
    }
}
