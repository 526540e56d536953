use serde::{Deserialize, Serialize};

/// Physical representation of a stored record.
///
/// A record without an encoding is stored as plain bytes. The wire name of
/// each variant doubles as the HTTP `Content-Encoding` value and as the
/// file suffix used by the filesystem backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// RFC 1952 gzip stream.
    Gzip,
}

impl Encoding {
    /// The wire name, e.g. `"gzip"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
        }
    }

    /// Parse a `Content-Encoding` header value.
    ///
    /// Returns `None` for encodings this crate cannot decode, including
    /// `identity`.
    pub fn from_content_encoding(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Self::Gzip),
            _ => None,
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of a stored record, read without opening its stream.
///
/// `size` is the size of the stored representation, which for a
/// gzip-encoded record is the compressed size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub size: Option<u64>,
    pub encoding: Option<Encoding>,
}

impl FileInfo {
    /// Metadata for a plain record of `size` bytes.
    pub fn plain(size: u64) -> Self {
        Self {
            size: Some(size),
            encoding: None,
        }
    }
}
