//! Network side of the sync engine.
//!
//! - [`ProxyFallbackFetcher`]: GET with ordered proxy rotation and a
//!   distinguished systemic failure.
//! - [`decode_pointer`] and friends: the indirection pointer codec.
//! - [`CatalogResolver`]: pointer to [`FullRecord`](tsundoku_model::FullRecord),
//!   never failing.
//! - [`BatchScheduler`]: sequential, delayed batches of concurrent resolves.

mod batch;
pub mod error;
mod fetcher;
mod pointer;
mod resolver;
pub mod transport;

pub use crate::batch::{BatchEvent, BatchOptions, BatchScheduler};
pub use crate::fetcher::{FetchOptions, ProxyFallbackFetcher, apply_prefix};
pub use crate::pointer::{decode_pointer, encode_pointer, normalize_path, pointer_url, raw_url};
pub use crate::resolver::{CatalogResolver, ResolveHint, ResolverOptions};
pub use crate::transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportHandle};
#[cfg(any(test, feature = "mock"))]
pub use crate::transport::{MockRoute, MockTransport};
