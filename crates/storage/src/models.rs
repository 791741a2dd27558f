//! Storage models.

use time::UtcDateTime;

/// Blob metadata returned by storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub key: String,
    /// Stored size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: UtcDateTime,
}
impl BlobInfo {
    pub fn new(key: impl Into<String>, size: u64, modified: UtcDateTime) -> Self {
        Self { key: key.into(), size, modified }
    }
}
