//! Cache Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// The backend refused the write for lack of space. Evict, then retry.
    #[display("cache quota exceeded")]
    QuotaExceeded,
    /// The backend failed for a reason other than space.
    #[display("cache backend error ({_0})")]
    Backend(#[error(not(source))] &'static str),
    /// A stored entry could not be parsed. It should be deleted, never served.
    #[display("corrupt cache entry: {_0}")]
    Corrupt(#[error(not(source))] String),
    /// Payload could not be serialized for storage.
    #[display("unserializable cache payload")]
    Serialization,
    /// No backend tier is usable in this execution context.
    #[display("no cache backend available")]
    Unavailable,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QuotaExceeded | Self::Backend(_) | Self::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::QuotaExceeded.is_retryable());
        assert!(!ErrorKind::Corrupt("k".to_string()).is_retryable());
        assert!(!ErrorKind::Unavailable.is_retryable());
    }
}
