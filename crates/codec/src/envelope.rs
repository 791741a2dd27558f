//! Byte-safe transport encoding for JSON payloads.
//!
//! An envelope is a single JSON string of the form
//! `"<marker><format>:<base64 of compressed JSON>"`. Text-only stores can hold
//! it verbatim, and [`decode_value`] recognises it by its marker.

use crate::Compression;
use crate::error::{ErrorKind, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use exn::{OptionExt, ResultExt};
use serde_json::Value;

/// Prefix identifying an encoded envelope.
pub const ENVELOPE_MARKER: &str = "~tsz1:";

/// Returns `true` if `value` is a string carrying an envelope.
pub fn is_envelope(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.starts_with(ENVELOPE_MARKER))
}

/// Wrap `value` in a compressed envelope.
///
/// [`Compression::None`] returns the value unchanged: there is nothing to
/// gain from base64-encoding uncompressed JSON.
pub fn encode_value(value: &Value, format: Compression) -> Result<Value> {
    if format == Compression::None {
        return Ok(value.clone());
    }
    let json = serde_json::to_vec(value).or_raise(|| ErrorKind::Serialization)?;
    let compressed = format.compress(&json)?;
    tracing::trace!(format = %format, raw = json.len(), compressed = compressed.len(), "Encoded envelope");
    Ok(Value::String(format!("{ENVELOPE_MARKER}{format}:{}", STANDARD.encode(compressed))))
}

/// Unwrap an envelope produced by [`encode_value`].
///
/// Anything that is not an envelope (objects, arrays, numbers, plain strings)
/// is returned as-is, so decoding already-decoded data is a no-op.
pub fn decode_value(value: Value) -> Result<Value> {
    let Some(body) = value.as_str().and_then(|s| s.strip_prefix(ENVELOPE_MARKER)) else {
        return Ok(value);
    };
    let (format, encoded) = body.split_once(':').ok_or_raise(|| ErrorKind::InvalidData)?;
    let format: Compression = format.parse()?;
    let compressed = STANDARD.decode(encoded).or_raise(|| ErrorKind::InvalidData)?;
    let json = format.decompress(&compressed)?;
    serde_json::from_slice(&json).or_raise(|| ErrorKind::Serialization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(Compression::Gzip)]
    #[case(Compression::Bzip2)]
    fn test_envelope_is_a_marked_string(#[case] format: Compression) {
        let value = json!({"title": "Solo Leveling", "chapters": [1, 2, 3]});
        let encoded = encode_value(&value, format).unwrap();
        assert!(is_envelope(&encoded));
        assert!(encoded.as_str().unwrap().starts_with(&format!("{ENVELOPE_MARKER}{format}:")));
        assert_eq!(decode_value(encoded).unwrap(), value);
    }

    #[test]
    fn test_no_compression_skips_envelope() {
        let value = json!([1, 2, 3]);
        let encoded = encode_value(&value, Compression::None).unwrap();
        assert!(!is_envelope(&encoded));
        assert_eq!(encoded, value);
    }

    #[rstest]
    #[case(json!({"already": "decoded"}))]
    #[case(json!("a plain string"))]
    #[case(json!(42))]
    #[case(json!(null))]
    fn test_decode_is_idempotent(#[case] value: Value) {
        assert_eq!(decode_value(value.clone()).unwrap(), value);
    }

    #[test]
    fn test_decode_twice_is_harmless() {
        let value = json!({"k": "v"});
        let once = decode_value(encode_value(&value, Compression::Gzip).unwrap()).unwrap();
        assert_eq!(decode_value(once).unwrap(), value);
    }

    #[rstest]
    #[case("~tsz1:gzip")]
    #[case("~tsz1:gzip:!!!not-base64!!!")]
    #[case("~tsz1:lz4:AAAA")]
    fn test_corrupt_envelope_errors(#[case] raw: &str) {
        assert!(decode_value(Value::String(raw.to_string())).is_err());
    }
}
