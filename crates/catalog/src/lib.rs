//! Catalog pagination, change detection and sync orchestration.
//!
//! - [`PageManager`] keeps the light index of the whole catalog and a
//!   bounded window of materialized pages.
//! - [`diff`] classifies a freshly resolved catalog against the previous
//!   snapshot.
//! - [`Syncer`] ties the remote index, the batch scheduler and the cache
//!   together.

mod diff;
pub mod error;
mod index;
mod page;
mod sync;

pub use crate::diff::diff;
pub use crate::index::{LightIndex, fetch_index};
pub use crate::page::{InitSource, MemoryStats, PageManager, PageMetadata, PageOptions, SearchFilters};
pub use crate::sync::{CATALOG_KEY, COOLDOWN_KEY, LIGHT_INDEX_KEY, SyncEvent, SyncOptions, SyncOutcome, Syncer};
