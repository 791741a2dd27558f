use crate::error::Result;
use crate::index::{LightIndex, fetch_index};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::mem::size_of;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tsundoku_model::{FullRecord, LightIndexEntry, PLACEHOLDER_DESCRIPTION, WorkType, sanitize};
use tsundoku_remote::{FetchOptions, ProxyFallbackFetcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOptions {
    pub page_size: usize,
    /// Pages kept resident on either side of the current page.
    pub window_radius: u32,
    /// Image used for works without a known cover.
    pub placeholder_image: String,
}
impl Default for PageOptions {
    fn default() -> Self {
        Self {
            page_size: 50,
            window_radius: 5,
            placeholder_image: "https://placehold.co/300x450?text=No+Cover".to_string(),
        }
    }
}

/// Where [`PageManager::initialize`] gets its light index from.
pub enum InitSource<'a> {
    /// A light index loaded from the cache.
    Prebuilt(LightIndex),
    /// Fetch the remote index and project it.
    Remote { fetcher: &'a ProxyFallbackFetcher, url: &'a str, options: &'a FetchOptions },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub version: String,
    pub total_mangas: usize,
    pub total_pages: u32,
    pub page_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    /// Keep only works of exactly this type.
    pub work_type: Option<WorkType>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub current_page: u32,
    pub loaded_pages: Vec<u32>,
    pub resident_records: usize,
    pub light_index_entries: usize,
    /// Rough heap footprint of resident records and the light index.
    pub estimated_bytes: usize,
}

#[derive(Default)]
struct State {
    metadata: Option<PageMetadata>,
    light: Arc<[LightIndexEntry]>,
    current_page: u32,
    loaded: BTreeMap<u32, Arc<[FullRecord]>>,
    materializing: HashSet<u32>,
}

impl State {
    fn total_pages(&self) -> u32 {
        self.metadata.as_ref().map_or(0, |m| m.total_pages)
    }
}

/// Keeps a light index of the whole catalog and a sliding window of
/// materialized pages around the current page.
///
/// Resident full records are bounded by `(2 * window_radius + 1) * page_size`,
/// however large the catalog is. Pages are 1-indexed.
pub struct PageManager {
    options: PageOptions,
    state: Mutex<State>,
    materialized: Notify,
}

impl PageManager {
    pub fn new(options: PageOptions) -> Self {
        let options = PageOptions { page_size: options.page_size.max(1), ..options };
        Self { options, state: Mutex::default(), materialized: Notify::new() }
    }

    pub fn options(&self) -> &PageOptions {
        &self.options
    }

    /// Load the light index. A second call returns the existing metadata
    /// without touching `source`, until [`reset`](Self::reset) is called.
    pub async fn initialize(&self, source: InitSource<'_>) -> Result<PageMetadata> {
        let mut state = self.state.lock().await;
        if let Some(metadata) = &state.metadata {
            tracing::debug!(version = %metadata.version, "Page manager already initialized");
            return Ok(metadata.clone());
        }
        let light = match source {
            InitSource::Prebuilt(light) => light,
            InitSource::Remote { fetcher, url, options } => LightIndex::project(&fetch_index(fetcher, url, options).await?),
        };
        let total_mangas = light.total();
        let metadata = PageMetadata {
            version: light.metadata.version.clone(),
            total_mangas,
            total_pages: u32::try_from(total_mangas.div_ceil(self.options.page_size)).unwrap_or(u32::MAX),
            page_size: self.options.page_size,
        };
        tracing::info!(version = %metadata.version, works = total_mangas, pages = metadata.total_pages, "Page manager initialized");
        state.light = light.entries.into();
        state.metadata = Some(metadata.clone());
        Ok(metadata)
    }

    /// Drop all state, returning to the uninitialized state.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        *state = State::default();
        self.materialized.notify_waiters();
    }

    pub async fn metadata(&self) -> Option<PageMetadata> {
        self.state.lock().await.metadata.clone()
    }

    pub async fn current_page(&self) -> u32 {
        self.state.lock().await.current_page
    }

    pub async fn total_pages(&self) -> u32 {
        self.state.lock().await.total_pages()
    }

    pub async fn loaded_pages(&self) -> Vec<u32> {
        self.state.lock().await.loaded.keys().copied().collect()
    }

    fn window(&self, page: u32, total_pages: u32) -> RangeInclusive<u32> {
        let radius = self.options.window_radius;
        page.saturating_sub(radius).max(1)..=page.saturating_add(radius).min(total_pages)
    }

    /// Move to page `n`, pruning pages outside the new window and
    /// materializing the missing ones before returning.
    ///
    /// Returns `false` without changing anything if `n` is out of range.
    /// Concurrent calls never materialize the same page twice: a page another
    /// call is already deriving is waited for instead.
    pub async fn go_to_page(&self, n: u32) -> bool {
        let (light, claimed) = {
            let mut state = self.state.lock().await;
            let total = state.total_pages();
            if n < 1 || n > total {
                tracing::debug!(page = n, total, "Page out of range");
                return false;
            }
            state.current_page = n;
            let window = self.window(n, total);
            state.loaded.retain(|page, _| window.contains(page));
            let claimed: Vec<u32> =
                window.filter(|page| !state.loaded.contains_key(page) && !state.materializing.contains(page)).collect();
            state.materializing.extend(claimed.iter().copied());
            (Arc::clone(&state.light), claimed)
        };

        let pages = futures::future::join_all(claimed.iter().map(|&page| {
            let light = Arc::clone(&light);
            async move { (page, self.materialize(&light, page)) }
        }))
        .await;

        {
            let mut state = self.state.lock().await;
            let window = self.window(state.current_page, state.total_pages());
            for (page, records) in pages {
                state.materializing.remove(&page);
                // A later call may have moved the window while this one was deriving.
                if window.contains(&page) {
                    state.loaded.insert(page, records);
                }
            }
            tracing::debug!(page = n, materialized = claimed.len(), loaded = state.loaded.len(), "Moved to page");
        }
        self.materialized.notify_waiters();

        // Wait for pages of this window that another call is still deriving.
        loop {
            let mut notified = std::pin::pin!(self.materialized.notified());
            notified.as_mut().enable();
            {
                let state = self.state.lock().await;
                let window = self.window(n, state.total_pages());
                if state.current_page != n || !window.clone().any(|page| state.materializing.contains(&page)) {
                    return true;
                }
            }
            notified.await;
        }
    }

    fn materialize(&self, light: &[LightIndexEntry], page: u32) -> Arc<[FullRecord]> {
        let size = self.options.page_size;
        let start = (page as usize - 1).saturating_mul(size).min(light.len());
        let end = start.saturating_add(size).min(light.len());
        light[start..end].iter().map(|entry| self.project(entry)).collect()
    }

    fn project(&self, entry: &LightIndexEntry) -> FullRecord {
        FullRecord {
            id: entry.id.clone(),
            url: entry.url.clone().unwrap_or_default(),
            title: sanitize(&entry.title),
            description: PLACEHOLDER_DESCRIPTION.to_string(),
            image_url: entry.cover_url.clone().unwrap_or_else(|| self.options.placeholder_image.clone()),
            work_type: entry.work_type.clone(),
            ..Default::default()
        }
    }

    /// Records of page `n`, if it is currently resident.
    pub async fn page_data(&self, n: u32) -> Option<Arc<[FullRecord]>> {
        self.state.lock().await.loaded.get(&n).cloned()
    }

    /// Case-insensitive title search over the light index.
    ///
    /// Titles starting with the query rank before titles merely containing
    /// it; within each group results are ordered by title. An empty query
    /// matches every work.
    pub async fn search(&self, query: &str, filters: &SearchFilters) -> Vec<LightIndexEntry> {
        let light = Arc::clone(&self.state.lock().await.light);
        let needle = query.trim().to_lowercase();
        let mut matches: Vec<(bool, String, &LightIndexEntry)> = light
            .iter()
            .filter(|entry| filters.work_type.as_ref().is_none_or(|t| *t == entry.work_type))
            .filter_map(|entry| {
                let title = entry.title.to_lowercase();
                match title.find(&needle) {
                    Some(0) => Some((false, title, entry)),
                    Some(_) => Some((true, title, entry)),
                    None => None,
                }
            })
            .collect();
        matches.sort_by(|a, b| (a.0, &a.1, &a.2.id).cmp(&(b.0, &b.1, &b.2.id)));
        let limit = filters.limit.unwrap_or(usize::MAX);
        matches.into_iter().take(limit).map(|(_, _, entry)| entry.clone()).collect()
    }

    /// Page on which the work `id` appears.
    pub async fn find_manga_page(&self, id: &str) -> Option<u32> {
        let state = self.state.lock().await;
        let position = state.light.iter().position(|entry| entry.id == id)?;
        u32::try_from(position / self.options.page_size + 1).ok()
    }

    pub async fn memory_stats(&self) -> MemoryStats {
        let state = self.state.lock().await;
        let resident_records = state.loaded.values().map(|page| page.len()).sum();
        let record_bytes: usize = state.loaded.values().flat_map(|page| page.iter()).map(record_bytes).sum();
        let light_bytes: usize = state.light.iter().map(light_bytes).sum();
        MemoryStats {
            current_page: state.current_page,
            loaded_pages: state.loaded.keys().copied().collect(),
            resident_records,
            light_index_entries: state.light.len(),
            estimated_bytes: record_bytes + light_bytes,
        }
    }
}

fn record_bytes(record: &FullRecord) -> usize {
    size_of::<FullRecord>()
        + record.id.len()
        + record.url.len()
        + record.title.len()
        + record.description.len()
        + record.image_url.len()
        + record.genres.iter().map(String::len).sum::<usize>()
}

fn light_bytes(entry: &LightIndexEntry) -> usize {
    size_of::<LightIndexEntry>()
        + entry.id.len()
        + entry.title.len()
        + entry.cover_url.as_ref().map_or(0, String::len)
        + entry.url.as_ref().map_or(0, String::len)
}
