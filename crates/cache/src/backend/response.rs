use crate::CacheEntry;
use crate::backend::{BackendKind, CacheBackend};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tsundoku_storage::BlobHandle;

const SYNTHETIC_ORIGIN: &str = "https://tsundoku.cache/";
const TIMESTAMP_HEADER: &str = "x-cache-timestamp";
const VERSION_HEADER: &str = "x-cache-version";

/// A stored response object, keyed by a synthetic request URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}
impl CachedResponse {
    fn for_entry(key: &str, entry: &CacheEntry) -> Result<Self> {
        let body = serde_json::to_string(entry).or_raise(|| ErrorKind::Serialization)?;
        let headers = BTreeMap::from([
            ("content-type".to_string(), "application/json".to_string()),
            ("content-length".to_string(), body.len().to_string()),
            (TIMESTAMP_HEADER.to_string(), entry.timestamp.to_string()),
            (VERSION_HEADER.to_string(), entry.version.to_string()),
        ]);
        Ok(Self { url: format!("{SYNTHETIC_ORIGIN}{key}"), status: 200, headers, body })
    }

    fn into_entry(self, key: &str) -> Result<CacheEntry> {
        if self.status != 200 {
            exn::bail!(ErrorKind::Corrupt(key.to_string()));
        }
        serde_json::from_str(&self.body).or_raise(|| ErrorKind::Corrupt(key.to_string()))
    }
}

/// Response-object cache tier.
///
/// Entries are wrapped in a [`CachedResponse`] under a named cache. This is
/// the tier a worker context falls back to when neither of the others is
/// reachable from it.
pub struct ResponseCacheBackend {
    store: BlobHandle,
    cache_name: String,
}
impl ResponseCacheBackend {
    pub fn new(store: BlobHandle, cache_name: impl Into<String>) -> Self {
        Self { store, cache_name: cache_name.into() }
    }

    fn namespace(&self) -> String {
        format!("{}/", self.cache_name)
    }

    fn blob_key(&self, key: &str) -> String {
        format!("{}/{key}", self.cache_name)
    }
}

#[async_trait]
impl CacheBackend for ResponseCacheBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Response
    }

    async fn probe(&self) -> bool {
        match self.store.list(Some(&self.namespace())).await {
            Ok(_) => true,
            Err(error) => {
                tracing::debug!(%error, cache = %self.cache_name, "Response cache tier unavailable");
                false
            },
        }
    }

    async fn read(&self, key: &str) -> Result<Option<CacheEntry>> {
        let Some(bytes) = self.store.get(&self.blob_key(key)).await.or_raise(|| ErrorKind::Backend("response read"))?
        else {
            return Ok(None);
        };
        let response: CachedResponse =
            serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Corrupt(key.to_string()))?;
        response.into_entry(key).map(Some)
    }

    async fn write(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let response = CachedResponse::for_entry(key, entry)?;
        let bytes = serde_json::to_vec(&response).or_raise(|| ErrorKind::Serialization)?;
        match self.store.put(&self.blob_key(key), &bytes).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_full() => Err(e).or_raise(|| ErrorKind::QuotaExceeded),
            Err(e) => Err(e).or_raise(|| ErrorKind::Backend("response write")),
        }
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.store.delete(&self.blob_key(key)).await.or_raise(|| ErrorKind::Backend("response delete"))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let namespace = self.namespace();
        let listed = self.store.list(Some(&namespace)).await.or_raise(|| ErrorKind::Backend("response list"))?;
        Ok(listed.into_iter().filter_map(|info| info.key.strip_prefix(&namespace).map(str::to_string)).collect())
    }

    async fn approx_bytes(&self) -> Result<u64> {
        self.store.usage(Some(&self.namespace())).await.or_raise(|| ErrorKind::Backend("response usage"))
    }
}
