//! Compression and transport encoding for cached catalog payloads.
//!
//! Some cache tiers (a flat key-value store in particular) are size
//! constrained and only hold text. This crate provides:
//!
//! - **Compression** of raw bytes behind the [`Compression`] enum
//!   ([`Compression::compress`], [`Compression::decompress`]) with format
//!   detection from magic bytes ([`Compression::from_magic_bytes`]).
//! - **Envelopes** ([`encode_value`], [`decode_value`]) that turn a JSON value
//!   into a compressed, base64-encoded string and back again. Decoding is
//!   idempotent: a value that was never wrapped is returned untouched, so
//!   toggling compression on an existing cache never invalidates its entries.

mod envelope;
pub mod error;
mod ops;
mod util;

pub use crate::envelope::{ENVELOPE_MARKER, decode_value, encode_value, is_envelope};

/// A supported compression format. Defaults to [`None`](Self::None).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Bzip2 compression
    Bzip2,
    /// Gzip compression
    Gzip,
}

#[cfg(test)]
mod tests {
    use crate::Compression;

    #[test]
    fn compression_default() {
        assert_eq!(Compression::default(), Compression::None);
    }
}
