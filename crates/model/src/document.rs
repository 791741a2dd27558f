use crate::chapters::Chapters;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};

/// A work's detail document, fetched through its indirection pointer.
///
/// Every descriptive field is optional upstream; the only structural
/// requirement is a `chapters` mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDocument {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "type")]
    pub work_type: Option<String>,
    pub chapters: Chapters,
}

impl WorkDocument {
    /// Parse and validate a detail document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes).or_raise(|| ErrorKind::Json)?;
        let Some(object) = value.as_object() else {
            exn::bail!(ErrorKind::InvalidDocument("document is not an object"));
        };
        match object.get("chapters") {
            Some(serde_json::Value::Object(_)) => {},
            _ => exn::bail!(ErrorKind::InvalidDocument("missing chapters")),
        }
        serde_json::from_value(value).or_raise(|| ErrorKind::InvalidDocument("malformed fields"))
    }

    /// Latest chapter timestamp in Unix seconds, or `0` without chapters.
    pub fn last_updated(&self) -> i64 {
        self.chapters.latest().map(|(_, c)| c.last_updated).unwrap_or(0)
    }
}
