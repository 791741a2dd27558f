//! Blob store trait and implementations.
//!
//! A blob store is a flat map from string keys to byte payloads. It knows
//! nothing about expiry, compression or namespacing; those are layered on
//! top by the cache crate.

mod directory;
#[cfg(feature = "mock")]
mod memory;

pub use self::directory::DirectoryStore;
#[cfg(feature = "mock")]
pub use self::memory::MemoryStore;
use crate::BlobInfo;
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

pub(crate) type BlobInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<BlobInfo>> + Send + 'a>>;

/// Unified interface for blob stores.
///
/// # Examples
///
/// ```
/// use tsundoku_storage::{BlobStore, error::Result};
///
/// async fn bump(store: &dyn BlobStore) -> Result<u64> {
///     let current = match store.get("counter").await? {
///         Some(bytes) => String::from_utf8_lossy(&bytes).parse().unwrap_or(0),
///         None => 0,
///     };
///     store.put("counter", (current + 1).to_string().as_bytes()).await?;
///     Ok(current + 1)
/// }
/// ```
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Name of the store, used for logging only.
    fn name(&self) -> &str;

    /// Stream metadata of every blob whose key starts with `prefix`.
    ///
    /// Ordering is unspecified.
    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> BlobInfoStream<'a>;

    /// Collect [`list_stream()`](Self::list_stream) into a [`Vec`].
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<BlobInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Read a blob, or `None` if it doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Create or replace a blob.
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Remove a blob. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Total stored bytes of blobs whose key starts with `prefix`.
    async fn usage(&self, prefix: Option<&str>) -> Result<u64> {
        self.list_stream(prefix).try_fold(0u64, |acc, info| async move { Ok(acc + info.size) }).await
    }
}
