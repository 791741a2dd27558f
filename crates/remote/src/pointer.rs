//! Indirection pointer codec.
//!
//! A catalog chapter points at its work's detail document through a URL of
//! the shape `https://<host>/read/gist/<token>`. The token is an unpadded
//! base64url encoding of a percent-escaped repository path such as
//! `raw/owner/repo/refs/heads/main/works/berserk.json`.

use crate::error::{ErrorKind, Result};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use exn::{OptionExt, ResultExt};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use regex::Regex;
use std::sync::LazyLock;

/// RFC 3986 unreserved characters pass through, everything else is escaped.
pub(crate) const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');
/// Pointer payloads keep their path separators.
const PAYLOAD: &AsciiSet = &COMPONENT.remove(b'/');

static POINTER_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/read/gist/([^/?#]+)").unwrap());

fn invalid(url: &str) -> impl FnOnce() -> ErrorKind + '_ {
    move || ErrorKind::InvalidPointer(url.to_string())
}

/// Decode the repository path embedded in an indirection URL.
///
/// The path is returned exactly as encoded; see [`normalize_path`] for the
/// branch-ref normalization applied before fetching.
pub fn decode_pointer(url: &str) -> Result<String> {
    let token = POINTER_PATTERN
        .captures(url)
        .and_then(|caps| caps.get(1))
        .ok_or_raise(invalid(url))?
        .as_str();
    let token = percent_decode_str(token).decode_utf8().or_raise(invalid(url))?;
    let mut standard: String = token
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    while standard.len() % 4 != 0 {
        standard.push('=');
    }
    let bytes = STANDARD.decode(standard.as_bytes()).or_raise(invalid(url))?;
    let escaped = String::from_utf8(bytes).or_raise(invalid(url))?;
    let path = percent_decode_str(&escaped).decode_utf8().or_raise(invalid(url))?.into_owned();
    if path.trim_matches('/').is_empty() {
        exn::bail!(ErrorKind::InvalidPointer(url.to_string()));
    }
    Ok(path)
}

/// Encode a repository path into an indirection token; the inverse of
/// [`decode_pointer`].
pub fn encode_pointer(path: &str) -> String {
    let escaped = utf8_percent_encode(path, PAYLOAD).to_string();
    URL_SAFE_NO_PAD.encode(escaped.as_bytes())
}

/// Build a full indirection URL for `path` on `host`.
pub fn pointer_url(host: &str, path: &str) -> String {
    format!("{}/read/gist/{}", host.trim_end_matches('/'), encode_pointer(path))
}

/// Strip a leading `raw/` and collapse `/refs/heads/` to `/`.
pub fn normalize_path(path: &str) -> String {
    let path = path.strip_prefix("raw/").unwrap_or(path);
    path.replacen("/refs/heads/", "/", 1)
}

/// Escape each segment of `path` and prepend the raw-content host.
pub fn raw_url(raw_host: &str, path: &str) -> String {
    let escaped: Vec<String> = path.split('/').map(|segment| utf8_percent_encode(segment, COMPONENT).to_string()).collect();
    format!("{}/{}", raw_host.trim_end_matches('/'), escaped.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const HOST: &str = "https://cubari.moe";

    #[rstest]
    #[case("raw/owner/repo/refs/heads/main/works/berserk.json")]
    #[case("owner/repo/refs/heads/main/raw/path/to/file.json")]
    #[case("owner/repo/main/file.json")]
    #[case("owner/repo/main/Spaced Name (1).json")]
    #[case("owner/repo/main/日本語/100%.json")]
    fn test_round_trip(#[case] path: &str) {
        let url = pointer_url(HOST, path);
        assert_eq!(decode_pointer(&url).unwrap(), path);
    }

    #[test]
    fn test_decodes_padded_alphabet() {
        // Unpadded, with a trailing slash after the token.
        let token = URL_SAFE_NO_PAD.encode(b"owner/repo/main/a%3Fb~.json");
        let url = format!("{HOST}/read/gist/{token}/");
        assert_eq!(decode_pointer(&url).unwrap(), "owner/repo/main/a?b~.json");
    }

    #[test]
    fn test_decodes_url_escaped_token() {
        let token = STANDARD.encode(b"owner/repo/main/x.json");
        let escaped = utf8_percent_encode(&token, NON_ALPHANUMERIC).to_string();
        let url = format!("{HOST}/read/gist/{escaped}");
        assert_eq!(decode_pointer(&url).unwrap(), "owner/repo/main/x.json");
    }

    #[rstest]
    #[case("https://cubari.moe/read/imgur/abc")]
    #[case("https://cubari.moe/read/gist/")]
    #[case("https://cubari.moe/read/gist/!!!!")]
    #[case("not a url")]
    #[case("")]
    fn test_rejects_invalid_pointers(#[case] url: &str) {
        let err = decode_pointer(url).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPointer(u) if u == url));
    }

    #[rstest]
    #[case("raw/owner/repo/refs/heads/main/f.json", "owner/repo/main/f.json")]
    #[case("owner/repo/refs/heads/main/f.json", "owner/repo/main/f.json")]
    #[case("owner/repo/main/f.json", "owner/repo/main/f.json")]
    #[case("owner/raw/f.json", "owner/raw/f.json")]
    fn test_normalize_path(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_path(input), expected);
    }

    #[test]
    fn test_raw_url_escapes_segments() {
        assert_eq!(
            raw_url("https://raw.githubusercontent.com/", "owner/repo/main/Spaced Name#1.json"),
            "https://raw.githubusercontent.com/owner/repo/main/Spaced%20Name%231.json"
        );
    }
}
