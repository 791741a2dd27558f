use crate::chapters::Chapters;
use crate::light::WorkType;
use serde::{Deserialize, Serialize};

/// Substituted when a work's document carries no description.
pub const PLACEHOLDER_DESCRIPTION: &str = "No description available.";

const FAILURE_TITLE: &str = "Unavailable";

/// Closed classification of per-item resolution failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The document could not be fetched or parsed.
    ItemResolution,
    /// The indirection pointer is malformed. Permanent until the source changes.
    InvalidPointer,
    /// The document parsed, but does not have the expected shape.
    Validation,
    /// Every transport route failed; the network as a whole is unavailable.
    SystemicNetwork,
}

impl FailureKind {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureKind::InvalidPointer)
    }

    pub fn is_systemic(&self) -> bool {
        matches!(self, FailureKind::SystemicNetwork)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub kind: FailureKind,
    pub original_error: String,
    /// Unix milliseconds at which the failure was recorded.
    pub timestamp: i64,
    pub retryable: bool,
}

/// A resolved work detail record, or a tagged failure standing in for one.
///
/// Failure records (`error == true`) are diagnostics only and must be
/// filtered out before anything is written to the canonical catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullRecord {
    /// Catalog key of the work, when known.
    #[serde(default)]
    pub id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub image_url: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(rename = "type", default)]
    pub work_type: WorkType,
    #[serde(default)]
    pub status: Option<String>,
    pub chapter_count: usize,
    /// Unix milliseconds of the newest chapter, `0` without chapters.
    pub last_updated: i64,
    #[serde(default, skip_serializing_if = "Chapters::is_empty")]
    pub chapters: Chapters,
    #[serde(default)]
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
}

impl FullRecord {
    /// Build a failure record for the work behind `url`.
    pub fn failure(url: impl Into<String>, kind: FailureKind, original_error: impl Into<String>, timestamp: i64) -> Self {
        let original_error = original_error.into();
        Self {
            url: url.into(),
            title: FAILURE_TITLE.to_string(),
            description: format!("This work could not be loaded: {original_error}"),
            error: true,
            error_details: Some(ErrorDetails { kind, original_error, timestamp, retryable: kind.is_retryable() }),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error_details.as_ref().map(|d| d.kind)
    }

    /// Identity used when comparing snapshots: the catalog key, or the
    /// indirection url for records resolved without one.
    pub fn key(&self) -> &str {
        if self.id.is_empty() { &self.url } else { &self.id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(FailureKind::ItemResolution, true)]
    #[case(FailureKind::InvalidPointer, false)]
    #[case(FailureKind::Validation, true)]
    #[case(FailureKind::SystemicNetwork, true)]
    fn test_failure_retryable(#[case] kind: FailureKind, #[case] retryable: bool) {
        let record = FullRecord::failure("https://cubari.moe/x", kind, "boom", 42);
        assert!(record.is_error());
        let details = record.error_details.as_ref().unwrap();
        assert_eq!(details.retryable, retryable);
        assert_eq!(details.timestamp, 42);
        assert_eq!(record.failure_kind(), Some(kind));
    }

    #[test]
    fn test_key_falls_back_to_url() {
        let mut record = FullRecord { url: "https://cubari.moe/a".to_string(), ..Default::default() };
        assert_eq!(record.key(), "https://cubari.moe/a");
        record.id = "JP_a".to_string();
        assert_eq!(record.key(), "JP_a");
    }

    #[test]
    fn test_serializes_camel_case() {
        let record = FullRecord::failure("u", FailureKind::InvalidPointer, "bad pointer", 7);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["error"], true);
        assert_eq!(json["errorDetails"]["kind"], "invalid_pointer");
        assert_eq!(json["errorDetails"]["originalError"], "bad pointer");
        assert_eq!(json["errorDetails"]["retryable"], false);
        assert!(json.get("imageUrl").is_some());
        assert!(json.get("chapters").is_none());
        let back: FullRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
