//! Cache backend tiers.
//!
//! Each tier implements [`CacheBackend`]. The [`CacheStore`](crate::CacheStore)
//! holds a ranked list of tiers that passed their availability probe and
//! falls through to the next one when the active tier stops accepting
//! writes.

mod keyvalue;
mod response;
mod sqlite;

pub use self::keyvalue::KeyValueBackend;
pub use self::response::{CachedResponse, ResponseCacheBackend};
pub use self::sqlite::SqliteBackend;
use crate::CacheEntry;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn CacheBackend>;

/// The kinds of backend tier, in their default rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Structured, queryable store.
    Sqlite,
    /// Flat, prefixed key-value store with an optional byte quota.
    KeyValue,
    /// Response-object cache; the only tier available to worker contexts.
    Response,
}
impl BackendKind {
    pub const DEFAULT_RANKING: [BackendKind; 3] = [BackendKind::Sqlite, BackendKind::KeyValue, BackendKind::Response];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::KeyValue => "keyvalue",
            BackendKind::Response => "response",
        }
    }
}
impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}
impl FromStr for BackendKind {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(BackendKind::Sqlite),
            "keyvalue" | "kv" => Ok(BackendKind::KeyValue),
            "response" => Ok(BackendKind::Response),
            _ => exn::bail!(ErrorKind::Backend("unknown backend kind")),
        }
    }
}

/// Where the cache is running, which decides the tiers it may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    #[default]
    Standard,
    /// A background worker only has access to the response-object cache.
    Worker,
}
impl ExecutionContext {
    pub fn permits(&self, kind: BackendKind) -> bool {
        match self {
            ExecutionContext::Standard => true,
            ExecutionContext::Worker => kind == BackendKind::Response,
        }
    }
}

/// A single cache tier.
///
/// Keys passed to a backend are logical keys; namespacing is the backend's
/// concern. Every method other than [`probe()`](Self::probe) may assume the
/// probe succeeded.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether payloads should be compressed before they are written here.
    fn wants_compression(&self) -> bool {
        false
    }

    /// Check the tier is usable right now.
    async fn probe(&self) -> bool;

    /// Read an entry. A stored entry that can't be parsed is reported as
    /// [`ErrorKind::Corrupt`].
    async fn read(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Store an entry, replacing any previous one.
    async fn write(&self, key: &str, entry: &CacheEntry) -> Result<()>;

    /// Remove an entry. Returns whether it existed.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Every logical key held by this tier.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Approximate stored bytes across all entries of this tier.
    async fn approx_bytes(&self) -> Result<u64>;

    /// Remove every entry of this tier. Returns the number removed.
    async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for key in self.keys().await? {
            if self.remove(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
