use crate::backend::{BackendHandle, BackendKind, CacheBackend, ExecutionContext};
use crate::error::{Error, ErrorKind, Result};
use crate::{CacheEntry, CacheHit};
use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::instrument;
use tsundoku_codec::{Compression, decode_value, encode_value};
use tsundoku_model::ClockHandle;

const DEFAULT_MAX_AGE_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Entries strictly older than this are logically absent.
    pub max_age_ms: i64,
    /// Applied only on tiers that ask for it.
    pub compression: Compression,
    /// Entries written under a different schema version are evicted on read.
    pub schema_version: u32,
    pub context: ExecutionContext,
}
impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_age_ms: DEFAULT_MAX_AGE_MS,
            compression: Compression::Gzip,
            schema_version: 1,
            context: ExecutionContext::Standard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub backend: BackendKind,
    pub entries: usize,
    pub approx_bytes: u64,
    /// Entries that are expired but not yet evicted.
    pub expired: usize,
}

/// Expiring cache over a ranked list of backend tiers.
///
/// Reads and maintenance operate on the active tier. A write the active tier
/// keeps refusing, even after a cleanup pass, demotes the store to the next
/// tier for the rest of its lifetime.
pub struct CacheStore {
    tiers: Vec<BackendHandle>,
    active: AtomicUsize,
    options: CacheOptions,
    clock: ClockHandle,
}

impl CacheStore {
    /// Probe `candidates` in rank order, keeping those that are usable in the
    /// configured execution context.
    #[instrument(skip_all, fields(context = ?options.context))]
    pub async fn open(
        candidates: impl IntoIterator<Item = BackendHandle>,
        options: CacheOptions,
        clock: ClockHandle,
    ) -> Result<Self> {
        let mut tiers = Vec::new();
        for backend in candidates {
            if !options.context.permits(backend.kind()) {
                tracing::debug!(backend = %backend.kind(), "Cache tier not permitted in this context");
                continue;
            }
            if backend.probe().await {
                tiers.push(backend);
            } else {
                tracing::warn!(backend = %backend.kind(), "Cache tier failed its probe, skipping");
            }
        }
        let Some(first) = tiers.first() else {
            exn::bail!(ErrorKind::Unavailable);
        };
        tracing::debug!(backend = %first.kind(), fallbacks = tiers.len() - 1, "Cache store ready");
        Ok(Self { tiers, active: AtomicUsize::new(0), options, clock })
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    fn active_index(&self) -> usize {
        self.active.load(Ordering::SeqCst).min(self.tiers.len() - 1)
    }

    fn active(&self) -> &dyn CacheBackend {
        self.tiers[self.active_index()].as_ref()
    }

    /// Kind of the tier currently serving reads.
    pub fn backend(&self) -> BackendKind {
        self.active().kind()
    }

    fn is_stale(&self, entry: &CacheEntry, now: i64) -> bool {
        entry.is_expired(now, self.options.max_age_ms) || entry.version != self.options.schema_version
    }

    async fn evict(&self, backend: &dyn CacheBackend, key: &str, reason: &'static str) {
        match backend.remove(key).await {
            Ok(_) => tracing::debug!(key, reason, "Evicted cache entry"),
            Err(error) => tracing::warn!(key, reason, ?error, "Failed to evict cache entry"),
        }
    }

    /// Read and decode an entry.
    ///
    /// Expired entries, entries of another schema version and entries that
    /// fail to parse are deleted and reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheHit<T>>> {
        let backend = self.active();
        let entry = match backend.read(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(e) if matches!(&*e, ErrorKind::Corrupt(_)) => {
                tracing::warn!(key, error = ?e, "Corrupt cache entry");
                self.evict(backend, key, "corrupt").await;
                return Ok(None);
            },
            Err(e) => return Err(e),
        };
        let now = self.clock.now_millis();
        if entry.is_expired(now, self.options.max_age_ms) {
            self.evict(backend, key, "expired").await;
            return Ok(None);
        }
        if entry.version != self.options.schema_version {
            self.evict(backend, key, "schema version mismatch").await;
            return Ok(None);
        }
        let decoded = decode_value(entry.data)
            .or_raise(|| ErrorKind::Corrupt(key.to_string()))
            .and_then(|value| serde_json::from_value::<T>(value).or_raise(|| ErrorKind::Corrupt(key.to_string())));
        match decoded {
            Ok(data) => Ok(Some(CacheHit { data, metadata: entry.metadata, version: entry.version, timestamp: entry.timestamp })),
            Err(error) => {
                tracing::warn!(key, ?error, "Undecodable cache entry");
                self.evict(backend, key, "corrupt").await;
                Ok(None)
            },
        }
    }

    /// Store `data` with `metadata` under `key`.
    #[instrument(skip(self, data, metadata))]
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, data: &T, metadata: Value) -> Result<()> {
        let value = serde_json::to_value(data).or_raise(|| ErrorKind::Serialization)?;
        let start = self.active_index();
        let mut last_error: Option<Error> = None;
        for (index, backend) in self.tiers.iter().enumerate().skip(start) {
            match self.write_to(backend.as_ref(), key, &value, &metadata).await {
                Ok(()) => {
                    if index != start {
                        self.active.fetch_max(index, Ordering::SeqCst);
                        tracing::warn!(backend = %backend.kind(), "Cache demoted to fallback tier");
                    }
                    return Ok(());
                },
                Err(error) => {
                    tracing::warn!(backend = %backend.kind(), ?error, "Cache write failed");
                    last_error = Some(error);
                },
            }
        }
        match last_error {
            Some(error) => Err(error),
            None => exn::bail!(ErrorKind::Unavailable),
        }
    }

    async fn write_to(&self, backend: &dyn CacheBackend, key: &str, value: &Value, metadata: &Value) -> Result<()> {
        let data = match backend.wants_compression() {
            true => encode_value(value, self.options.compression).or_raise(|| ErrorKind::Serialization)?,
            false => value.clone(),
        };
        let entry = CacheEntry {
            data,
            timestamp: self.clock.now_millis(),
            metadata: metadata.clone(),
            version: self.options.schema_version,
        };
        match backend.write(key, &entry).await {
            Err(e) if *e == ErrorKind::QuotaExceeded => {
                let evicted = self.cleanup_backend(backend).await?;
                tracing::info!(key, evicted, "Cache quota exceeded, retrying after cleanup");
                backend.write(key, &entry).await
            },
            result => result,
        }
    }

    pub async fn remove(&self, key: &str) -> Result<bool> {
        self.active().remove(key).await
    }

    /// Remove every entry this store owns, across all tiers.
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for backend in &self.tiers {
            removed += backend.clear().await?;
        }
        tracing::info!(removed, "Cleared cache");
        Ok(removed)
    }

    /// Evict every stale or corrupt entry of the active tier.
    pub async fn cleanup(&self) -> Result<usize> {
        self.cleanup_backend(self.active()).await
    }

    async fn cleanup_backend(&self, backend: &dyn CacheBackend) -> Result<usize> {
        let now = self.clock.now_millis();
        let mut evicted = 0;
        for key in backend.keys().await? {
            let stale = match backend.read(&key).await {
                Ok(Some(entry)) => self.is_stale(&entry, now),
                Ok(None) => false,
                Err(e) if matches!(&*e, ErrorKind::Corrupt(_)) => true,
                Err(e) => return Err(e),
            };
            if stale && backend.remove(&key).await? {
                evicted += 1;
            }
        }
        tracing::debug!(backend = %backend.kind(), evicted, "Cache cleanup complete");
        Ok(evicted)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let backend = self.active();
        let now = self.clock.now_millis();
        let keys = backend.keys().await?;
        let mut expired = 0;
        for key in &keys {
            if let Ok(Some(entry)) = backend.read(key).await
                && entry.is_expired(now, self.options.max_age_ms)
            {
                expired += 1;
            }
        }
        Ok(CacheStats { backend: backend.kind(), entries: keys.len(), approx_bytes: backend.approx_bytes().await?, expired })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{KeyValueBackend, ResponseCacheBackend, SqliteBackend};
    use crate::Database;
    use serde_json::json;
    use std::sync::Arc;
    use tsundoku_model::ManualClock;
    use tsundoku_storage::BlobStore;
    use tsundoku_storage::backend::MemoryStore;

    const MAX_AGE: i64 = 10_000;

    fn options(compression: Compression) -> CacheOptions {
        CacheOptions { max_age_ms: MAX_AGE, compression, ..Default::default() }
    }

    async fn kv_store(clock: Arc<ManualClock>) -> (Arc<MemoryStore>, CacheStore) {
        let blobs = Arc::new(MemoryStore::default());
        let backend: BackendHandle = Arc::new(KeyValueBackend::new(blobs.clone(), "tsundoku:"));
        let store = CacheStore::open([backend], options(Compression::Gzip), clock).await.unwrap();
        (blobs, store)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let clock = ManualClock::at(1_000);
        let (_, store) = kv_store(clock).await;
        store.set("catalog", &vec!["a", "b"], json!({"catalogVersion": "1.0.0"})).await.unwrap();
        let hit = store.get::<Vec<String>>("catalog").await.unwrap().unwrap();
        assert_eq!(hit.data, vec!["a", "b"]);
        assert_eq!(hit.metadata["catalogVersion"], "1.0.0");
        assert_eq!(hit.timestamp, 1_000);
        assert!(store.get::<Vec<String>>("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_compresses_on_keyvalue_tier() {
        let clock = ManualClock::at(0);
        let (blobs, store) = kv_store(clock).await;
        store.set("k", &json!({"payload": "x".repeat(64)}), Value::Null).await.unwrap();
        let raw: Value = serde_json::from_slice(&blobs.get("tsundoku:k").await.unwrap().unwrap()).unwrap();
        assert!(tsundoku_codec::is_envelope(&raw["data"]));
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss_and_evicted() {
        let clock = ManualClock::at(5_000);
        let (blobs, store) = kv_store(clock.clone()).await;
        store.set("k", &1, Value::Null).await.unwrap();
        clock.set(5_000 + MAX_AGE);
        assert!(store.get::<i32>("k").await.unwrap().is_some());
        clock.set(5_000 + MAX_AGE + 1);
        assert!(store.get::<i32>("k").await.unwrap().is_none());
        assert!(blobs.get("tsundoku:k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reads_uncompressed_entries_when_compression_enabled() {
        let clock = ManualClock::at(0);
        let raw = CacheEntry { data: json!([1, 2, 3]), timestamp: 0, metadata: Value::Null, version: 1 };
        let blobs = Arc::new(MemoryStore::with_blobs([("tsundoku:k", serde_json::to_vec(&raw).unwrap())]));
        let backend: BackendHandle = Arc::new(KeyValueBackend::new(blobs, "tsundoku:"));
        let store = CacheStore::open([backend], options(Compression::Bzip2), clock).await.unwrap();
        assert_eq!(store.get::<Vec<i32>>("k").await.unwrap().unwrap().data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_evicted() {
        let clock = ManualClock::at(0);
        let raw = CacheEntry { data: json!(1), timestamp: 0, metadata: Value::Null, version: 99 };
        let blobs = Arc::new(MemoryStore::with_blobs([("tsundoku:k", serde_json::to_vec(&raw).unwrap())]));
        let backend: BackendHandle = Arc::new(KeyValueBackend::new(blobs.clone(), "tsundoku:"));
        let store = CacheStore::open([backend], options(Compression::None), clock).await.unwrap();
        assert!(store.get::<i32>("k").await.unwrap().is_none());
        assert!(blobs.get("tsundoku:k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_deleted() {
        let clock = ManualClock::at(0);
        let blobs = Arc::new(MemoryStore::with_blobs([("tsundoku:k", b"garbage".as_slice())]));
        let backend: BackendHandle = Arc::new(KeyValueBackend::new(blobs.clone(), "tsundoku:"));
        let store = CacheStore::open([backend], options(Compression::None), clock).await.unwrap();
        assert!(store.get::<i32>("k").await.unwrap().is_none());
        assert!(blobs.get("tsundoku:k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_shape_counts_as_corrupt() {
        let clock = ManualClock::at(0);
        let (blobs, store) = kv_store(clock).await;
        store.set("k", &"a string", Value::Null).await.unwrap();
        assert!(store.get::<Vec<i32>>("k").await.unwrap().is_none());
        assert!(blobs.get("tsundoku:k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_quota_triggers_cleanup_then_retry() {
        let clock = ManualClock::at(0);
        let blobs = Arc::new(MemoryStore::default());
        let backend: BackendHandle = Arc::new(KeyValueBackend::new(blobs.clone(), "p:").with_quota(250));
        let store = CacheStore::open([backend], options(Compression::None), clock.clone()).await.unwrap();
        store.set("old", &"x".repeat(100), Value::Null).await.unwrap();
        clock.advance(MAX_AGE + 1);
        store.set("new", &"y".repeat(100), Value::Null).await.unwrap();
        assert!(blobs.get("p:old").await.unwrap().is_none());
        assert!(store.get::<String>("new").await.unwrap().is_some());
        assert_eq!(store.backend(), BackendKind::KeyValue);
    }

    #[tokio::test]
    async fn test_persistent_quota_failure_demotes_tier() {
        let clock = ManualClock::at(0);
        let blobs = Arc::new(MemoryStore::default());
        let tiers: Vec<BackendHandle> = vec![
            Arc::new(KeyValueBackend::new(blobs.clone(), "p:").with_quota(32)),
            Arc::new(ResponseCacheBackend::new(blobs.clone(), "responses")),
        ];
        let store = CacheStore::open(tiers, options(Compression::None), clock).await.unwrap();
        store.set("big", &"z".repeat(200), Value::Null).await.unwrap();
        assert_eq!(store.backend(), BackendKind::Response);
        assert_eq!(store.get::<String>("big").await.unwrap().unwrap().data, "z".repeat(200));
    }

    #[tokio::test]
    async fn test_worker_context_selects_response_cache() {
        let clock = ManualClock::at(0);
        let blobs = Arc::new(MemoryStore::default());
        let tiers: Vec<BackendHandle> = vec![
            Arc::new(KeyValueBackend::new(blobs.clone(), "p:")),
            Arc::new(ResponseCacheBackend::new(blobs, "responses")),
        ];
        let options = CacheOptions { context: ExecutionContext::Worker, ..Default::default() };
        let store = CacheStore::open(tiers, options, clock).await.unwrap();
        assert_eq!(store.backend(), BackendKind::Response);
    }

    #[tokio::test]
    async fn test_unavailable_without_usable_tiers() {
        let clock = ManualClock::at(0);
        let blobs = Arc::new(MemoryStore::default());
        blobs.set_offline(true);
        let backend: BackendHandle = Arc::new(KeyValueBackend::new(blobs, "p:"));
        let err = CacheStore::open([backend], CacheOptions::default(), clock).await.err().unwrap();
        assert_eq!(*err, ErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_probe_failure_falls_through_to_next_tier() {
        let clock = ManualClock::at(0);
        let offline = Arc::new(MemoryStore::default());
        offline.set_offline(true);
        let db = Database::connect_in_memory().await.unwrap();
        let tiers: Vec<BackendHandle> =
            vec![Arc::new(KeyValueBackend::new(offline, "p:")), Arc::new(SqliteBackend::from(&db))];
        let store = CacheStore::open(tiers, CacheOptions::default(), clock).await.unwrap();
        assert_eq!(store.backend(), BackendKind::Sqlite);
    }

    #[tokio::test]
    async fn test_clear_leaves_foreign_keys() {
        let clock = ManualClock::at(0);
        let blobs = Arc::new(MemoryStore::with_blobs([("someone-else", b"mine".as_slice())]));
        let backend: BackendHandle = Arc::new(KeyValueBackend::new(blobs.clone(), "tsundoku:"));
        let store = CacheStore::open([backend], CacheOptions::default(), clock).await.unwrap();
        store.set("a", &1, Value::Null).await.unwrap();
        store.set("b", &2, Value::Null).await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(blobs.get("someone-else").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_and_stats() {
        let clock = ManualClock::at(0);
        let db = Database::connect_in_memory().await.unwrap();
        let backend: BackendHandle = Arc::new(SqliteBackend::from(&db));
        let store = CacheStore::open([backend], options(Compression::None), clock.clone()).await.unwrap();
        store.set("old", &1, Value::Null).await.unwrap();
        clock.advance(MAX_AGE + 1);
        store.set("fresh", &2, Value::Null).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.backend, BackendKind::Sqlite);
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.expired, 1);
        assert!(stats.approx_bytes > 0);

        assert_eq!(store.cleanup().await.unwrap(), 1);
        let stats = store.stats().await.unwrap();
        assert_eq!((stats.entries, stats.expired), (1, 0));
    }
}
