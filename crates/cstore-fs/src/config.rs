use serde::{Deserialize, Serialize};

/// Options for [`FolderContentStorage`](crate::FolderContentStorage).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderStorageOptions {
    /// Store every record directly under the root instead of spreading
    /// records over `sha1(id)`-prefixed shard directories.
    pub disable_prefix_hash: bool,
}
