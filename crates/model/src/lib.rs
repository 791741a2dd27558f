//! Data model for the catalog sync engine.
//!
//! - [`CatalogIndex`] / [`CatalogIndexEntry`] / [`ChapterStub`]: the raw
//!   remote index, replaced wholesale on every full resync.
//! - [`LightIndexEntry`]: the minimal per-work projection used for
//!   pagination and search.
//! - [`FullRecord`]: a resolved (or failed) work detail record.
//! - [`UpdateRecord`]: the output of diffing two catalog snapshots.

mod chapters;
mod clock;
mod document;
pub mod error;
mod index;
mod light;
mod record;
mod sanitize;
mod update;

pub use crate::chapters::{ChapterStub, Chapters};
pub use crate::clock::{Clock, ClockHandle, ManualClock, SystemClock};
pub use crate::document::WorkDocument;
pub use crate::index::{CatalogIndex, CatalogIndexEntry, IndexMetadata};
pub use crate::light::{LightIndexEntry, WorkType};
pub use crate::record::{ErrorDetails, FailureKind, FullRecord, PLACEHOLDER_DESCRIPTION};
pub use crate::sanitize::sanitize;
pub use crate::update::{ChapterChange, UpdateKind, UpdateRecord};

/// Convert a Unix timestamp in seconds to milliseconds, saturating on overflow.
#[inline]
pub fn seconds_to_millis(seconds: i64) -> i64 {
    seconds.saturating_mul(1000)
}
