use std::path::PathBuf;

/// Errors from content storage operations.
///
/// Absence is never an error: lookups report a missing record as `None` or
/// `false`. Only contract violations and write-path failures surface here.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The id would resolve to a path outside the storage root.
    #[error("id {id:?} resolves outside the storage root")]
    PathTraversal { id: String },

    /// The compressor was asked to write its output over its own input.
    #[error("cannot compress {path:?} into itself")]
    CompressIntoSelf { path: PathBuf },

    /// The object store rejected our credentials.
    #[error("not authorized to access object store: {0}")]
    NotAuthorized(String),

    /// Any other failure reported by an object store.
    #[error("object store error: {0}")]
    ObjectStore(String),

    /// The storage configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
