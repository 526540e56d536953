//! Storage contract shared by every cstore backend.
//!
//! Callers write and read arbitrary byte streams keyed by an opaque id
//! (typically a content hash), check existence singly or in batch, delete,
//! enumerate ids by prefix, and query size/encoding metadata.
//!
//! # Backends
//!
//! All backends implement the [`ContentStorage`] trait:
//!
//! - [`InMemoryContentStorage`] -- `HashMap`-based storage for tests and embedding
//! - `FolderContentStorage` (crate `cstore-fs`) -- sharded local directory tree
//!   with optional gzip compression
//! - `S3ContentStorage` (crate `cstore-s3`) -- S3-compatible object store
//!
//! # Records
//!
//! A record is either plain or stored with an [`Encoding`]. Retrieval hands
//! out a [`ContentItem`], which opens the record lazily and can return the
//! decoded payload or the bytes exactly as stored.
//!
//! # Design Rules
//!
//! 1. Absence is a value (`None`/`false`), not an error.
//! 2. Stores fully replace; there is no merge and no history.
//! 3. Reads may degrade transient backend failures to "absent"; such failures
//!    are logged, never silently dropped.
//! 4. There is no cross-id atomicity. Batch results are not snapshots.

pub mod error;
pub mod item;
pub mod memory;
pub mod traits;
pub mod types;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StorageError, StorageResult};
pub use item::{bytes_to_stream, stream_to_bytes, ByteStream, ContentItem};
pub use memory::InMemoryContentStorage;
pub use traits::{ContentStorage, FileIdStream};
pub use types::{Encoding, FileInfo};
