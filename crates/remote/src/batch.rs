use crate::resolver::{CatalogResolver, ResolveHint};
use async_stream::stream;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tsundoku_model::{FullRecord, LightIndexEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub size: usize,
    /// Pause between consecutive batches, relieving the upstream proxies.
    pub delay: Duration,
}
impl Default for BatchOptions {
    fn default() -> Self {
        Self { size: 150, delay: Duration::from_millis(1000) }
    }
}

/// Progress events emitted by [`BatchScheduler::stream`].
///
/// Events follow a strict ordering:
/// 1. [`Skipped`](Self::Skipped): zero or more times, one per entry without
///    an addressable url.
/// 2. [`Started`](Self::Started): exactly once.
/// 3. [`Batch`](Self::Batch): once per batch, in input order.
/// 4. [`Complete`](Self::Complete): exactly once.
///
/// Dropping the stream between batches abandons the remaining batches; a
/// batch already in flight always runs to completion first.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Skipped { id: String },
    Started { total: usize, batches: usize },
    Batch {
        index: usize,
        /// Results in input order, failures included.
        records: Vec<FullRecord>,
        /// How many records of this batch failed because the network as a
        /// whole was unavailable.
        systemic: usize,
    },
    Complete { resolved: usize, failed: usize, skipped: usize },
}

/// Resolves light index entries in sequential, fixed-size batches.
#[derive(Clone)]
pub struct BatchScheduler {
    resolver: Arc<CatalogResolver>,
    options: BatchOptions,
}

impl BatchScheduler {
    pub fn new(resolver: Arc<CatalogResolver>, options: BatchOptions) -> Self {
        Self { resolver, options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    pub fn resolver(&self) -> &CatalogResolver {
        &self.resolver
    }

    /// Stream [`BatchEvent`]s while resolving `entries`.
    ///
    /// Every entry of a batch is resolved concurrently; batches run one
    /// after another with the configured delay between them.
    pub fn stream(&self, entries: Vec<LightIndexEntry>) -> impl Stream<Item = BatchEvent> + '_ {
        stream!({
            let (addressable, unaddressable): (Vec<_>, Vec<_>) = entries
                .into_iter()
                .partition(|entry| entry.url.as_deref().is_some_and(|url| !url.trim().is_empty()));
            for entry in &unaddressable {
                tracing::warn!(id = %entry.id, "Skipping work without an addressable url");
                yield BatchEvent::Skipped { id: entry.id.clone() };
            }

            let size = self.options.size.max(1);
            let batches = addressable.len().div_ceil(size);
            yield BatchEvent::Started { total: addressable.len(), batches };

            let (mut resolved, mut failed) = (0, 0);
            for (index, batch) in addressable.chunks(size).enumerate() {
                let records = futures::future::join_all(batch.iter().map(|entry| {
                    let hint = ResolveHint::from(entry);
                    let url = entry.url.clone().unwrap_or_default();
                    async move { self.resolver.resolve(&url, &hint).await }
                }))
                .await;
                let errors = records.iter().filter(|r| r.is_error()).count();
                let systemic = records.iter().filter(|r| r.failure_kind().is_some_and(|k| k.is_systemic())).count();
                resolved += records.len() - errors;
                failed += errors;
                tracing::debug!(batch = index, of = batches, errors, systemic, "Batch resolved");
                yield BatchEvent::Batch { index, records, systemic };

                if index + 1 < batches {
                    tokio::time::sleep(self.options.delay).await;
                }
            }

            yield BatchEvent::Complete { resolved, failed, skipped: unaddressable.len() };
        })
    }

    /// Resolve every addressable entry, returning all results (failures
    /// included) in input order.
    pub async fn process_in_batches(&self, entries: Vec<LightIndexEntry>) -> Vec<FullRecord> {
        let mut all = Vec::with_capacity(entries.len());
        let mut events = Box::pin(self.stream(entries));
        while let Some(event) = events.next().await {
            if let BatchEvent::Batch { records, .. } = event {
                all.extend(records);
            }
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{FetchOptions, ProxyFallbackFetcher};
    use crate::pointer::pointer_url;
    use crate::resolver::ResolverOptions;
    use crate::transport::MockTransport;
    use serde_json::json;
    use tsundoku_model::{ManualClock, WorkType};

    const RAW: &str = "https://raw.example";

    fn entry(id: &str, url: Option<String>) -> LightIndexEntry {
        LightIndexEntry { id: id.to_string(), title: id.to_string(), work_type: WorkType::Manga, cover_url: None, url }
    }

    fn fixtures(count: usize) -> (Arc<MockTransport>, Vec<LightIndexEntry>) {
        let mut transport = MockTransport::new();
        let mut entries = Vec::new();
        for i in 0..count {
            let path = format!("owner/repo/main/{i}.json");
            transport = transport.json(format!("{RAW}/{path}"), &json!({"chapters": {"1": {"last_updated": i}}}));
            entries.push(entry(&format!("JP_{i}"), Some(pointer_url("https://cubari.moe", &path))));
        }
        (Arc::new(transport), entries)
    }

    fn scheduler(transport: Arc<MockTransport>, size: usize) -> BatchScheduler {
        let options = ResolverOptions {
            raw_host: RAW.to_string(),
            fetch: FetchOptions { timeout: Duration::from_millis(100), retries: 0 },
            ..Default::default()
        };
        let resolver = CatalogResolver::new(ProxyFallbackFetcher::new(transport, vec![]), options, ManualClock::at(0));
        BatchScheduler::new(Arc::new(resolver), BatchOptions { size, delay: Duration::from_millis(1000) })
    }

    #[tokio::test(start_paused = true)]
    async fn test_preserves_input_order_across_batches() {
        let (transport, entries) = fixtures(7);
        let records = scheduler(transport.clone(), 3).process_in_batches(entries).await;
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["JP_0", "JP_1", "JP_2", "JP_3", "JP_4", "JP_5", "JP_6"]);
        assert!(records.iter().all(|r| !r.is_error()));
        assert_eq!(transport.call_count(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_sequence() {
        let (transport, mut entries) = fixtures(4);
        entries.insert(1, entry("JP_nourl", None));
        entries.push(entry("JP_blank", Some("  ".to_string())));
        let scheduler = scheduler(transport, 2);
        let events: Vec<_> = scheduler.stream(entries).collect().await;
        assert_eq!(events[0], BatchEvent::Skipped { id: "JP_nourl".to_string() });
        assert_eq!(events[1], BatchEvent::Skipped { id: "JP_blank".to_string() });
        assert_eq!(events[2], BatchEvent::Started { total: 4, batches: 2 });
        assert!(matches!(&events[3], BatchEvent::Batch { index: 0, records, systemic: 0 } if records.len() == 2));
        assert!(matches!(&events[4], BatchEvent::Batch { index: 1, records, systemic: 0 } if records.len() == 2));
        assert_eq!(events[5], BatchEvent::Complete { resolved: 4, failed: 0, skipped: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_batches() {
        let (transport, entries) = fixtures(3);
        let started = tokio::time::Instant::now();
        scheduler(transport, 1).process_in_batches(entries).await;
        assert_eq!(started.elapsed(), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flags_systemic_batches() {
        let (_, entries) = fixtures(2);
        // No routes at all: every document fetch exhausts its routes.
        let records_stream = scheduler(Arc::new(MockTransport::new()), 5);
        let events: Vec<_> = records_stream.stream(entries).collect().await;
        assert!(matches!(&events[1], BatchEvent::Batch { systemic: 2, .. }));
        assert_eq!(events[2], BatchEvent::Complete { resolved: 0, failed: 2, skipped: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_systemic_records_per_batch() {
        let (transport, entries) = fixtures(3);
        transport.set_route(format!("{RAW}/owner/repo/main/1.json"), crate::transport::MockRoute::Fail);
        let scheduler = scheduler(transport, 2);
        let events: Vec<_> = scheduler.stream(entries).collect().await;
        assert!(matches!(&events[1], BatchEvent::Batch { index: 0, records, systemic: 1 } if records.len() == 2));
        assert!(matches!(&events[2], BatchEvent::Batch { index: 1, systemic: 0, .. }));
        assert_eq!(events[3], BatchEvent::Complete { resolved: 2, failed: 1, skipped: 0 });
    }
}
