use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cached payload as stored by every backend tier.
///
/// `data` is either the payload itself or a compressed envelope string,
/// depending on the tier it was written to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Value,
    /// Unix milliseconds of the write.
    pub timestamp: i64,
    #[serde(default)]
    pub metadata: Value,
    /// Schema version of the store that wrote the entry.
    pub version: u32,
}

impl CacheEntry {
    /// Logically absent once strictly older than `max_age_ms`.
    pub fn is_expired(&self, now_ms: i64, max_age_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp) > max_age_ms
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).or_raise(|| ErrorKind::Serialization)
    }

    pub(crate) fn from_bytes(key: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).or_raise(|| ErrorKind::Corrupt(key.to_string()))
    }
}

/// An unexpired, decoded cache read.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit<T> {
    pub data: T,
    pub metadata: Value,
    pub version: u32,
    pub timestamp: i64,
}
