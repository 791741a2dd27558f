use crate::CacheEntry;
use crate::backend::{BackendKind, CacheBackend};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use tsundoku_storage::BlobHandle;

const PROBE_KEY: &str = "__probe__";

/// Flat key-value tier over a blob store.
///
/// Every key is stored under a fixed namespace prefix, and blobs outside
/// that namespace are never read, listed or removed. Payloads are compressed
/// before they reach this tier, since it may be size-constrained.
pub struct KeyValueBackend {
    store: BlobHandle,
    prefix: String,
    quota_bytes: Option<u64>,
}
impl KeyValueBackend {
    pub fn new(store: BlobHandle, prefix: impl Into<String>) -> Self {
        Self { store, prefix: prefix.into(), quota_bytes: None }
    }

    /// Refuse writes that would grow the namespace past `bytes`.
    pub fn with_quota(mut self, bytes: u64) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    async fn check_quota(&self, key: &str, incoming: u64) -> Result<()> {
        let Some(quota) = self.quota_bytes else {
            return Ok(());
        };
        let listed = self.store.list(Some(&self.prefix)).await.or_raise(|| ErrorKind::Backend("keyvalue list"))?;
        let others: u64 = listed.iter().filter(|info| info.key != key).map(|info| info.size).sum();
        if others + incoming > quota {
            tracing::debug!(key, incoming, used = others, quota, "Key-value quota exceeded");
            exn::bail!(ErrorKind::QuotaExceeded);
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for KeyValueBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    fn wants_compression(&self) -> bool {
        true
    }

    async fn probe(&self) -> bool {
        let key = self.namespaced(PROBE_KEY);
        let written = self.store.put(&key, b"1").await.is_ok();
        let read = written && matches!(self.store.get(&key).await, Ok(Some(_)));
        let _ = self.store.delete(&key).await;
        if !read {
            tracing::debug!(store = %self.store.name(), "Key-value cache tier unavailable");
        }
        read
    }

    async fn read(&self, key: &str) -> Result<Option<CacheEntry>> {
        let bytes = self.store.get(&self.namespaced(key)).await.or_raise(|| ErrorKind::Backend("keyvalue read"))?;
        bytes.map(|bytes| CacheEntry::from_bytes(key, &bytes)).transpose()
    }

    async fn write(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let key = self.namespaced(key);
        let bytes = entry.to_bytes()?;
        self.check_quota(&key, bytes.len() as u64).await?;
        match self.store.put(&key, &bytes).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_full() => Err(e).or_raise(|| ErrorKind::QuotaExceeded),
            Err(e) => Err(e).or_raise(|| ErrorKind::Backend("keyvalue write")),
        }
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.store.delete(&self.namespaced(key)).await.or_raise(|| ErrorKind::Backend("keyvalue delete"))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let listed = self.store.list(Some(&self.prefix)).await.or_raise(|| ErrorKind::Backend("keyvalue list"))?;
        Ok(listed
            .into_iter()
            .filter_map(|info| info.key.strip_prefix(&self.prefix).map(str::to_string))
            .filter(|key| key != PROBE_KEY)
            .collect())
    }

    async fn approx_bytes(&self) -> Result<u64> {
        self.store.usage(Some(&self.prefix)).await.or_raise(|| ErrorKind::Backend("keyvalue usage"))
    }
}
