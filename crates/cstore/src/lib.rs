//! Content-addressable blob storage.
//!
//! Applications pick a backend at runtime from a [`StorageConfig`] and talk
//! to it only through the [`ContentStorage`] trait:
//!
//! ```no_run
//! # async fn run() -> cstore::StorageResult<()> {
//! use cstore::{bytes_to_stream, open_storage, ContentStorage, StorageConfig};
//!
//! let config = StorageConfig::from_toml_str(
//!     r#"
//!     backend = "folder"
//!     root = "/var/lib/cstore"
//!     "#,
//! )?;
//! let storage = open_storage(&config).await?;
//! storage.store_stream_and_compress("some-id", bytes_to_stream("123")).await?;
//! assert!(storage.exist("some-id").await?);
//! # Ok(())
//! # }
//! ```

pub mod config;


use std::sync::Arc;

use tracing::info;

pub use config::{FolderConfig, StorageConfig};
pub use cstore_core::{
    bytes_to_stream, stream_to_bytes, ByteStream, ContentItem, ContentStorage, Encoding,
    FileIdStream, FileInfo, InMemoryContentStorage, StorageError, StorageResult,
};
pub use cstore_fs::{FolderContentStorage, FolderStorageOptions};
pub use cstore_s3::{S3Config, S3ContentStorage};

/// Open the backend described by `config`.
pub async fn open_storage(config: &StorageConfig) -> StorageResult<Arc<dyn ContentStorage>> {
    let storage: Arc<dyn ContentStorage> = match config {
        StorageConfig::Folder(folder) => {
            Arc::new(FolderContentStorage::new(&folder.root, folder.options.clone()).await?)
        }
        StorageConfig::S3(s3) => Arc::new(S3ContentStorage::from_config(s3)?),
        StorageConfig::Memory => {
            info!("opened in-memory content storage");
            Arc::new(InMemoryContentStorage::new())
        }
    };
    Ok(storage)
}
