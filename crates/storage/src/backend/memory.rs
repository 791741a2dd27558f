//! In-memory blob store for testing.

use super::BlobInfoStream;
use crate::error::{ErrorKind, Result};
use crate::{BlobInfo, BlobStore, validate_key};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use time::UtcDateTime;
use tokio::sync::RwLock;

/// In-memory blob store for testing.
///
/// Blobs are stored in a `HashMap` behind a [`RwLock`]. The store can be
/// switched offline (every call fails) or given a byte capacity (writes that
/// would exceed it fail with [`StorageFull`](ErrorKind::StorageFull)) to
/// exercise fallback paths in the layers above.
///
/// # Examples
///
/// ```
/// use tsundoku_storage::backend::MemoryStore;
/// use tsundoku_storage::BlobStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::with_blobs([("a", b"1")]);
/// assert!(store.get("a").await?.is_some());
/// # Ok(())
/// # }
/// ```
pub struct MemoryStore {
    name: String,
    storage: RwLock<HashMap<String, (UtcDateTime, Vec<u8>)>>,
    capacity: Option<usize>,
    offline: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Create a store pre-populated with blobs.
    ///
    /// Panics if any key fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_blobs(blobs: impl IntoIterator<Item = (impl Into<String>, impl AsRef<[u8]>)>) -> Self {
        let now = UtcDateTime::now();
        let mut map = HashMap::new();
        for (key, data) in blobs {
            let key = key.into();
            if validate_key(&key).is_err() {
                panic!("MemoryStore::with_blobs: invalid key {key:?}");
            }
            map.insert(key, (now, data.as_ref().to_vec()));
        }
        Self {
            name: "memory".to_string(),
            storage: RwLock::new(map),
            capacity: None,
            offline: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Limit the total number of stored bytes.
    pub fn with_capacity(mut self, bytes: usize) -> Self {
        self.capacity = Some(bytes);
        self
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful `put` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::BackendError(format!("{} is offline", self.name)));
        }
        Ok(())
    }
}
impl Default for MemoryStore {
    fn default() -> Self {
        let blobs: [(&str, &[u8]); 0] = [];
        Self::with_blobs(blobs)
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> BlobInfoStream<'a> {
        Box::pin(stream! {
            if let Err(e) = self.check_online() {
                yield Err(e);
                return;
            }
            // Snapshot under the read lock, then drop it before yielding.
            let entries: Vec<BlobInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(key, _)| prefix.is_none_or(|pfx| key.starts_with(pfx)))
                    .map(|(key, (modified, data))| BlobInfo::new(key.clone(), data.len() as u64, *modified))
                    .collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_online()?;
        let key = validate_key(key)?;
        Ok(self.storage.read().await.get(key).map(|(_, data)| data.clone()))
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.check_online()?;
        let key = validate_key(key)?;
        let mut guard = self.storage.write().await;
        if let Some(capacity) = self.capacity {
            let others: usize = guard.iter().filter(|(k, _)| k.as_str() != key).map(|(_, (_, d))| d.len()).sum();
            if others + data.len() > capacity {
                exn::bail!(ErrorKind::StorageFull);
            }
        }
        guard.insert(key.to_string(), (UtcDateTime::now(), data.to_vec()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_online()?;
        let key = validate_key(key)?;
        Ok(self.storage.write().await.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryStore::default();
        store.put("k", b"hello").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap(), b"hello");
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_capacity() {
        let store = MemoryStore::default().with_capacity(4);
        store.put("a", b"123").await.unwrap();
        let err = store.put("b", b"45").await.unwrap_err();
        assert!(err.is_full());
        // Replacing a blob only counts the new size.
        store.put("a", b"1234").await.unwrap();
    }

    #[tokio::test]
    async fn test_offline() {
        let store = MemoryStore::with_blobs([("a", b"1")]);
        store.set_offline(true);
        assert!(store.get("a").await.is_err());
        assert!(store.list(None).await.is_err());
        store.set_offline(false);
        assert!(store.get("a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let store = MemoryStore::with_blobs([("p:a", b"1".as_slice()), ("p:b", b"22".as_slice()), ("q:c", b"333".as_slice())]);
        assert_eq!(store.list(Some("p:")).await.unwrap().len(), 2);
        assert_eq!(store.usage(None).await.unwrap(), 6);
    }

    #[test]
    #[should_panic(expected = "invalid key")]
    fn test_with_blobs_panics_on_bad_key() {
        MemoryStore::with_blobs([("", b"bad")]);
    }
}
