use crate::diff::diff;
use crate::error::{ErrorKind, Result};
use crate::index::{LightIndex, fetch_index};
use async_stream::stream;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use tsundoku_cache::{CacheHit, CacheStore};
use tsundoku_model::{ClockHandle, FullRecord, UpdateRecord};
use tsundoku_remote::{BatchEvent, BatchScheduler, FetchOptions};

pub const CATALOG_KEY: &str = "catalog";
pub const LIGHT_INDEX_KEY: &str = "light_index";
pub const COOLDOWN_KEY: &str = "cooldown";

const VERSION_FIELD: &str = "catalogVersion";
/// When the catalog was stored (Unix milliseconds); the next diff's cutoff.
const CHECKED_FIELD: &str = "checkedAt";

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub index_url: String,
    pub fetch: FetchOptions,
    /// How long syncing is suppressed after a systemic network failure.
    pub cooldown: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncOutcome {
    /// `false` when the remote version matched the cached catalog.
    pub updated: bool,
    pub version: String,
    pub records: Vec<FullRecord>,
    pub updates: Vec<UpdateRecord>,
    /// Works that could not be resolved; never part of `records`.
    pub failures: Vec<FullRecord>,
}

/// Progress events emitted by [`Syncer::sync_events`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once.
/// 2. [`IndexFetched`](Self::IndexFetched): exactly once.
/// 3. Either [`Unchanged`](Self::Unchanged) once, or
///    [`BatchResolved`](Self::BatchResolved) once per batch, each preceded
///    by [`NetworkDegraded`](Self::NetworkDegraded) when some of its works
///    were unreachable.
/// 4. [`Complete`](Self::Complete): exactly once.
///
/// An error terminates the stream early, in which case
/// [`Complete`](Self::Complete) is never emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Started,
    IndexFetched { version: String, entries: usize },
    /// The cached catalog is current; no work was resolved.
    Unchanged { version: String },
    /// Some, but not all, works of a batch failed on every route. They are
    /// reported as failures and the sync carries on.
    NetworkDegraded { batch: usize, failed: usize },
    BatchResolved { index: usize, batches: usize, records: Vec<FullRecord> },
    Complete(SyncOutcome),
}

/// Drives a catalog sync against the cache.
///
/// The cached catalog is only ever replaced by a successful sync. Systemic
/// failures (an unreachable index, or a batch where every work was
/// unreachable) leave the last good catalog in place and start a cooldown.
pub struct Syncer {
    cache: Arc<CacheStore>,
    scheduler: BatchScheduler,
    options: SyncOptions,
    clock: ClockHandle,
}

fn cached_version(metadata: &Value) -> Option<&str> {
    metadata.get(VERSION_FIELD).and_then(Value::as_str)
}

impl Syncer {
    pub fn new(cache: Arc<CacheStore>, scheduler: BatchScheduler, options: SyncOptions, clock: ClockHandle) -> Self {
        Self { cache, scheduler, options, clock }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    async fn stored_catalog(&self) -> Result<Option<CacheHit<Vec<FullRecord>>>> {
        self.cache.get::<Vec<FullRecord>>(CATALOG_KEY).await.or_raise(|| ErrorKind::Cache)
    }

    /// The last good catalog and the version it was synced under.
    pub async fn cached_catalog(&self) -> Result<Option<(String, Vec<FullRecord>)>> {
        let hit = self.stored_catalog().await?;
        Ok(hit.map(|hit| (cached_version(&hit.metadata).unwrap_or_default().to_string(), hit.data)))
    }

    /// The light index persisted by the last successful sync.
    pub async fn cached_light_index(&self) -> Result<Option<LightIndex>> {
        let hit = self.cache.get::<LightIndex>(LIGHT_INDEX_KEY).await.or_raise(|| ErrorKind::Cache)?;
        Ok(hit.map(|hit| hit.data))
    }

    /// Deadline (Unix milliseconds) of the active cooldown, if any.
    pub async fn cooldown_until(&self) -> Result<Option<i64>> {
        let hit = self.cache.get::<i64>(COOLDOWN_KEY).await.or_raise(|| ErrorKind::Cache)?;
        Ok(hit.map(|hit| hit.data).filter(|until| *until > self.clock.now_millis()))
    }

    async fn start_cooldown(&self) {
        let until = self.clock.now_millis().saturating_add(i64::try_from(self.options.cooldown.as_millis()).unwrap_or(i64::MAX));
        if let Err(error) = self.cache.set(COOLDOWN_KEY, &until, Value::Null).await {
            tracing::warn!(?error, "Failed to record sync cooldown");
        }
    }

    /// Persist a synced catalog.
    ///
    /// The catalog entry is written last and is the commit point: until it
    /// lands, the previous catalog (and its check time) stays readable, so a
    /// failed write makes the next sync resolve and diff this version again.
    async fn store(&self, version: &str, light: &LightIndex, records: &[FullRecord]) -> Result<()> {
        let checked = self.clock.now_millis();
        self.cache.set(LIGHT_INDEX_KEY, light, json!({ VERSION_FIELD: version })).await.or_raise(|| ErrorKind::Cache)?;
        self.cache
            .set(CATALOG_KEY, records, json!({ VERSION_FIELD: version, CHECKED_FIELD: checked }))
            .await
            .or_raise(|| ErrorKind::Cache)?;
        if let Err(error) = self.cache.remove(COOLDOWN_KEY).await {
            tracing::warn!(?error, "Failed to drop expired sync cooldown");
        }
        Ok(())
    }

    /// Stream [`SyncEvent`]s while syncing the catalog.
    pub fn sync_events(&self) -> impl Stream<Item = Result<SyncEvent>> + '_ {
        stream!({
            yield Ok(SyncEvent::Started);

            match self.cooldown_until().await {
                Ok(Some(until)) => {
                    tracing::warn!(until, "Sync suppressed by cooldown");
                    yield Err(exn::Exn::from(ErrorKind::CoolingDown(until)));
                    return;
                },
                Ok(None) => {},
                Err(e) => {
                    yield Err(e);
                    return;
                },
            }

            let fetcher = self.scheduler.resolver().fetcher();
            let index = match fetch_index(fetcher, &self.options.index_url, &self.options.fetch).await {
                Ok(index) => index,
                Err(e) => {
                    if e.is_systemic() {
                        tracing::error!(error = ?e, "Catalog index unreachable");
                        self.start_cooldown().await;
                    }
                    yield Err(e);
                    return;
                },
            };
            let version = index.version().to_string();
            yield Ok(SyncEvent::IndexFetched { version: version.clone(), entries: index.entries.len() });

            let previous = match self.stored_catalog().await {
                Ok(previous) => previous,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            if let Some(hit) = &previous
                && cached_version(&hit.metadata) == Some(version.as_str())
            {
                tracing::info!(%version, works = hit.data.len(), "Catalog unchanged");
                yield Ok(SyncEvent::Unchanged { version: version.clone() });
                yield Ok(SyncEvent::Complete(SyncOutcome { updated: false, version, records: hit.data.clone(), ..Default::default() }));
                return;
            }

            let light = LightIndex::project(&index);
            let mut resolved = Vec::with_capacity(light.entries.len());
            let mut events = Box::pin(self.scheduler.stream(light.entries.clone()));
            let mut total_batches = 0;
            while let Some(event) = events.next().await {
                match event {
                    BatchEvent::Started { batches, .. } => total_batches = batches,
                    BatchEvent::Batch { index, records, systemic } if systemic > 0 && systemic == records.len() => {
                        tracing::error!(batch = index, failed = systemic, "Network unavailable, keeping cached catalog");
                        self.start_cooldown().await;
                        yield Err(exn::Exn::from(ErrorKind::NetworkUnavailable));
                        return;
                    },
                    BatchEvent::Batch { index, records, systemic } => {
                        if systemic > 0 {
                            tracing::warn!(batch = index, failed = systemic, "Some works unreachable on every route");
                            yield Ok(SyncEvent::NetworkDegraded { batch: index, failed: systemic });
                        }
                        resolved.extend(records.iter().cloned());
                        yield Ok(SyncEvent::BatchResolved { index, batches: total_batches, records });
                    },
                    BatchEvent::Skipped { .. } | BatchEvent::Complete { .. } => {},
                }
            }
            drop(events);

            let (records, failures): (Vec<_>, Vec<_>) = resolved.into_iter().partition(|r| !r.is_error());
            let updates = match &previous {
                Some(hit) => {
                    let last_check = hit.metadata.get(CHECKED_FIELD).and_then(Value::as_i64).unwrap_or(0);
                    diff(&hit.data, &records, last_check)
                },
                // Nothing to compare the first catalog against.
                None => Vec::new(),
            };

            if let Err(e) = self.store(&version, &light, &records).await {
                yield Err(e);
                return;
            }
            tracing::info!(%version, works = records.len(), failed = failures.len(), updates = updates.len(), "Catalog synced");
            yield Ok(SyncEvent::Complete(SyncOutcome { updated: true, version, records, updates, failures }));
        })
    }

    /// Sync the catalog, returning once everything has been resolved and
    /// persisted.
    #[instrument(skip(self), fields(index = %self.options.index_url))]
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let mut events = Box::pin(self.sync_events());
        while let Some(event) = events.next().await {
            if let SyncEvent::Complete(outcome) = event? {
                return Ok(outcome);
            }
        }
        exn::bail!(ErrorKind::Incomplete)
    }
}
