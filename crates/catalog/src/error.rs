//! Catalog Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote catalog could not be reached over any route. The last good
    /// cached catalog is left untouched.
    #[display("network unavailable")]
    NetworkUnavailable,
    /// A previous systemic failure suppresses syncing until the deadline
    /// (Unix milliseconds) has passed.
    #[display("sync cooling down until {_0}")]
    CoolingDown(#[error(not(source))] i64),
    /// The remote index was fetched but is not a valid catalog index.
    #[display("invalid catalog index")]
    InvalidIndex,
    #[display("cache error")]
    Cache,
    /// The event stream ended before the sync completed.
    #[display("sync ended before completing")]
    Incomplete,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkUnavailable | Self::CoolingDown(_) | Self::Cache)
    }

    /// Returns `true` if the failure indicates broad network unavailability.
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::NetworkUnavailable | Self::CoolingDown(_))
    }
}
