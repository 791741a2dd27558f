//! Model Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A model error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for model parsing.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The payload is not valid JSON at all.
    #[display("malformed JSON")]
    Json,
    /// The remote catalog index does not have the expected shape.
    #[display("invalid catalog index: {_0}")]
    InvalidIndex(#[error(not(source))] &'static str),
    /// A work's detail document does not have the expected shape.
    #[display("invalid work document: {_0}")]
    InvalidDocument(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
