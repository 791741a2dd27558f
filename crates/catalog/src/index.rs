use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use tsundoku_model::{CatalogIndex, IndexMetadata, LightIndexEntry};
use tsundoku_remote::{FetchOptions, ProxyFallbackFetcher};

/// The light index of a catalog version, as persisted between sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightIndex {
    pub metadata: IndexMetadata,
    pub entries: Vec<LightIndexEntry>,
}

impl LightIndex {
    /// Project every entry of a raw index, keeping document order.
    pub fn project(index: &CatalogIndex) -> Self {
        Self { metadata: index.metadata.clone(), entries: index.entries.iter().map(LightIndexEntry::from).collect() }
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Declared total if present, otherwise the number of projected entries.
    pub fn total(&self) -> usize {
        self.metadata.total_mangas.unwrap_or(self.entries.len())
    }
}

/// Fetch and parse the remote catalog index.
///
/// Any fetch failure is systemic: without the index nothing else can be
/// resolved.
#[instrument(skip(fetcher, options))]
pub async fn fetch_index(fetcher: &ProxyFallbackFetcher, url: &str, options: &FetchOptions) -> Result<CatalogIndex> {
    let response = fetcher.fetch(url, options).await.or_raise(|| ErrorKind::NetworkUnavailable)?;
    let index = CatalogIndex::from_slice(&response.body).or_raise(|| ErrorKind::InvalidIndex)?;
    tracing::info!(version = index.version(), entries = index.entries.len(), "Fetched catalog index");
    Ok(index)
}
