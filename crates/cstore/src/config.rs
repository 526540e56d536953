use std::path::{Path, PathBuf};

use cstore_core::{StorageError, StorageResult};
use cstore_fs::FolderStorageOptions;
use cstore_s3::S3Config;
use serde::{Deserialize, Serialize};

/// Settings for the local-filesystem backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderConfig {
    pub root: PathBuf,
    #[serde(flatten)]
    pub options: FolderStorageOptions,
}

/// Which backend to open, and how.
///
/// ```toml
/// backend = "folder"
/// root = "/var/lib/cstore"
/// disable_prefix_hash = false
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    Folder(FolderConfig),
    S3(S3Config),
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory
    }
}

impl StorageConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> StorageResult<Self> {
        toml::from_str(s).map_err(|e| StorageError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> StorageResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Short backend name, as used in the `backend` key.
    pub fn backend_name(&self) -> &'static str {
        match self {
            StorageConfig::Folder(_) => "folder",
            StorageConfig::S3(_) => "s3",
            StorageConfig::Memory => "memory",
        }
    }
}
