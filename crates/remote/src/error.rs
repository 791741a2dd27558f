//! Remote Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A remote error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The indirection pointer is malformed. Permanent until the source data changes.
    #[display("invalid pointer: {_0}")]
    InvalidPointer(#[error(not(source))] String),
    /// A single HTTP attempt failed below the HTTP layer.
    #[display("transport error")]
    Transport,
    /// Every route (direct and proxied) failed. The network is unavailable,
    /// not just one document.
    #[display("all proxies failed after {_0} attempts")]
    AllProxiesFailed(#[error(not(source))] usize),
    /// The document body isn't JSON.
    #[display("malformed document")]
    MalformedDocument,
    /// The document is JSON but lacks the expected shape.
    #[display("invalid document: {_0}")]
    InvalidDocument(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport | Self::AllProxiesFailed(_))
    }

    /// Returns `true` if the failure indicates broad network unavailability.
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::AllProxiesFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ErrorKind::AllProxiesFailed(3).is_systemic());
        assert!(ErrorKind::AllProxiesFailed(3).is_retryable());
        assert!(!ErrorKind::Transport.is_systemic());
        assert!(!ErrorKind::InvalidPointer("x".to_string()).is_retryable());
        assert_eq!(ErrorKind::AllProxiesFailed(4).to_string(), "all proxies failed after 4 attempts");
    }
}
