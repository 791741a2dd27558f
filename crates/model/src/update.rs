use crate::record::FullRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    NewWork,
    NewChapters,
}

/// A chapter published after the previous check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterChange {
    pub title: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub key: String,
}

/// One entry of a snapshot diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecord {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    #[serde(rename = "manga")]
    pub work: FullRecord,
    /// Sorted newest first. Always empty for [`UpdateKind::NewWork`].
    pub new_chapters: Vec<ChapterChange>,
    /// Unix milliseconds.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let update = UpdateRecord {
            kind: UpdateKind::NewChapters,
            work: FullRecord::default(),
            new_chapters: vec![ChapterChange { title: "Ch. 2".to_string(), timestamp: 2000, key: "2".to_string() }],
            timestamp: 2000,
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "new_chapters");
        assert!(json.get("manga").is_some());
        assert_eq!(json["newChapters"][0]["key"], "2");
    }
}
