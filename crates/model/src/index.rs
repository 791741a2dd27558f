use crate::chapters::Chapters;
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt::{Formatter, Result as FmtResult};
use tracing::instrument;

/// Declared metadata of the remote catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Catalog version string; any change means a full resync is required.
    pub version: String,
    /// Declared number of works, when the catalog publishes one.
    #[serde(default, alias = "totalMangas", alias = "total", alias = "count", skip_serializing_if = "Option::is_none")]
    pub total_mangas: Option<usize>,
}

/// A raw work entry of the remote index.
///
/// `key` encodes a region/type prefix (usually a two-letter country code)
/// that is used to infer the work type when none is given explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogIndexEntry {
    pub key: String,
    pub title: String,
    pub chapters: Chapters,
}

/// The remote catalog index, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogIndex {
    pub metadata: IndexMetadata,
    pub entries: Vec<CatalogIndexEntry>,
}

#[derive(Deserialize)]
struct RawIndex {
    metadata: Option<IndexMetadata>,
    mangas: Option<RawEntries>,
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    chapters: Chapters,
}

struct RawEntries(Vec<CatalogIndexEntry>);

impl<'de> Deserialize<'de> for RawEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;
        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawEntries;

            fn expecting(&self, f: &mut Formatter<'_>) -> FmtResult {
                f.write_str("a map of work keys to work entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, raw)) = access.next_entry::<String, RawEntry>()? {
                    entries.push(CatalogIndexEntry { key, title: raw.title, chapters: raw.chapters });
                }
                Ok(RawEntries(entries))
            }
        }
        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl CatalogIndex {
    /// Parse and validate a remote index document.
    #[instrument(skip(bytes), fields(size = bytes.len()))]
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: RawIndex = serde_json::from_slice(bytes).or_raise(|| ErrorKind::Json)?;
        let metadata = raw.metadata.ok_or_raise(|| ErrorKind::InvalidIndex("missing metadata"))?;
        if metadata.version.trim().is_empty() {
            exn::bail!(ErrorKind::InvalidIndex("empty metadata.version"));
        }
        let entries = raw.mangas.ok_or_raise(|| ErrorKind::InvalidIndex("missing mangas"))?.0;
        tracing::debug!(version = %metadata.version, entries = entries.len(), "Parsed catalog index");
        Ok(Self { metadata, entries })
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Declared total if present, otherwise the number of entries.
    pub fn total(&self) -> usize {
        self.metadata.total_mangas.unwrap_or(self.entries.len())
    }
}
