//! Local-filesystem backend for cstore.
//!
//! [`FolderContentStorage`] keeps each record as one file below a root
//! directory:
//!
//! ```text
//! root/
//!   9584/some-id          plain record
//!   ea6c/another-id.gzip  gzip-encoded record
//! ```
//!
//! The shard directory is the first four hex digits of `sha1(id)` and can be
//! disabled with [`FolderStorageOptions::disable_prefix_hash`].
//!
//! # Components
//!
//! - [`PathResolver`] -- id to physical path, with path-traversal rejection
//! - [`EncodingProbe`] -- finds which representation of a record exists
//! - [`Compressor`] -- gzips a stored file and decides whether to keep it
//! - [`DirectoryWalker`] -- lazy, restartable id enumeration
//!
//! All of them run on an injected [`FileSystem`]; [`LocalFileSystem`] is the
//! `tokio::fs` implementation.

pub mod compression;
pub mod config;
pub mod folder;
pub mod fs;
pub mod path;
pub mod probe;
pub mod walker;

pub use compression::{compressed_path, CompressionResult, Compressor, COMPRESSED_SUFFIX, MIN_GAIN_RATIO};
pub use config::FolderStorageOptions;
pub use folder::FolderContentStorage;
pub use fs::{best_effort_remove, FileSystem, LocalFileSystem};
pub use path::{shard_of, PathResolver};
pub use probe::{EncodingProbe, Located};
pub use walker::DirectoryWalker;
