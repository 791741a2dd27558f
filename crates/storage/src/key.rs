//! Key validation.
//!
//! Keys are opaque strings to callers, but every backend must be able to
//! store them. This module rejects the ones that no backend could.

use crate::error::{ErrorKind, Result};

/// Longest accepted key, in bytes.
pub const MAX_KEY_LEN: usize = 512;

/// Validates a blob key.
///
/// # Examples
///
/// ```
/// use tsundoku_storage::validate_key;
/// assert!(validate_key("tsundoku:catalog").is_ok());
/// assert!(validate_key("https://example.com/a?b=c").is_ok());
/// assert!(validate_key("").is_err());
/// assert!(validate_key("a\0b").is_err());
/// ```
pub fn validate(key: &str) -> Result<&str> {
    if key.is_empty() || key.len() > MAX_KEY_LEN || key.chars().any(char::is_control) {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert_eq!(validate("catalog").unwrap(), "catalog");
        assert_eq!(validate("tsundoku:light_index").unwrap(), "tsundoku:light_index");
        assert!(validate("../../etc/passwd").is_ok());
        assert!(validate("ключ/日本").is_ok());
    }

    #[test]
    fn test_invalid_keys() {
        assert!(validate("").is_err());
        assert!(validate("line\nbreak").is_err());
        assert!(validate(&"x".repeat(MAX_KEY_LEN + 1)).is_err());
        let err = validate("tab\there").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(k) if k == "tab\there"));
    }
}
