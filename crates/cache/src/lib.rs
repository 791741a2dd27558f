//! Tiered cache store.
//!
//! The cache holds the last good catalog snapshot, its light index and the
//! bookkeeping of the sync engine. It is never the source of truth: deleting
//! it costs one full resync.
//!
//! # Architecture
//! - [`CacheStore`] owns a ranked list of [`CacheBackend`] tiers and applies
//!   the expiry, schema-version and compression policy on top of them.
//! - [`SqliteBackend`] is the structured tier, [`KeyValueBackend`] the flat
//!   prefixed tier, and [`ResponseCacheBackend`] the response-object tier
//!   used by worker contexts.

pub mod backend;
mod db;
mod entry;
pub mod error;
mod store;

pub use crate::backend::{
    BackendHandle, BackendKind, CacheBackend, ExecutionContext, KeyValueBackend, ResponseCacheBackend, SqliteBackend,
};
pub use crate::db::Database;
pub use crate::entry::{CacheEntry, CacheHit};
pub use crate::store::{CacheOptions, CacheStats, CacheStore};
