use crate::index::CatalogIndexEntry;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Region prefixes of catalog keys and the work type they imply.
const KEY_PREFIX_TYPES: &[(&str, WorkType)] = &[
    ("JP", WorkType::Manga),
    ("KR", WorkType::Manhwa),
    ("CN", WorkType::Manhua),
    ("TW", WorkType::Manhua),
    ("HK", WorkType::Manhua),
    ("US", WorkType::Comic),
    ("GB", WorkType::Comic),
];

/// Kind of serialized work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum WorkType {
    #[default]
    Manga,
    Manhwa,
    Manhua,
    Comic,
    Novel,
    /// Anything upstream labels with a type this crate doesn't know.
    Other(String),
}

impl WorkType {
    pub fn as_str(&self) -> &str {
        match self {
            WorkType::Manga => "manga",
            WorkType::Manhwa => "manhwa",
            WorkType::Manhua => "manhua",
            WorkType::Comic => "comic",
            WorkType::Novel => "novel",
            WorkType::Other(other) => other,
        }
    }

    /// Infer the work type from a catalog key's region prefix.
    ///
    /// The prefix is the leading run of ASCII letters, and only counts when it
    /// is exactly two letters long (`KR_title`, `jp-title`).
    pub fn from_key(key: &str) -> Option<Self> {
        let prefix: String = key.chars().take_while(char::is_ascii_alphabetic).collect();
        if prefix.len() != 2 || key.len() == 2 {
            return None;
        }
        let prefix = prefix.to_ascii_uppercase();
        KEY_PREFIX_TYPES.iter().find(|(p, _)| *p == prefix).map(|(_, t)| t.clone())
    }
}

impl Display for WorkType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkType {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "manga" => WorkType::Manga,
            "manhwa" | "webtoon" => WorkType::Manhwa,
            "manhua" => WorkType::Manhua,
            "comic" | "comics" => WorkType::Comic,
            "novel" | "light novel" => WorkType::Novel,
            other => WorkType::Other(other.to_string()),
        })
    }
}

impl Serialize for WorkType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for WorkType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or_default())
    }
}

/// Minimal per-work projection used for pagination and search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightIndexEntry {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub work_type: WorkType,
    #[serde(default)]
    pub cover_url: Option<String>,
    /// Indirection pointer of the work; `None` if no chapter carries one.
    #[serde(default)]
    pub url: Option<String>,
}

impl From<&CatalogIndexEntry> for LightIndexEntry {
    fn from(entry: &CatalogIndexEntry) -> Self {
        let explicit_type = entry
            .chapters
            .iter()
            .find_map(|(_, c)| c.work_type.as_deref().filter(|t| !t.trim().is_empty()))
            .map(|t| t.parse::<WorkType>().unwrap_or_default());
        let title = match entry.title.trim() {
            "" => entry.chapters.iter().find_map(|(_, c)| c.title.clone()).unwrap_or_else(|| entry.key.clone()),
            title => title.to_string(),
        };
        Self {
            id: entry.key.clone(),
            title,
            work_type: explicit_type.or_else(|| WorkType::from_key(&entry.key)).unwrap_or_default(),
            cover_url: entry.chapters.first_cover().map(str::to_string),
            url: entry.chapters.first_addressable().and_then(|c| c.url.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapters::{ChapterStub, Chapters};
    use rstest::rstest;

    #[rstest]
    #[case("KR_solo-leveling", Some(WorkType::Manhwa))]
    #[case("jp-one-piece", Some(WorkType::Manga))]
    #[case("CN123", Some(WorkType::Manhua))]
    #[case("KRX_something", None)]
    #[case("ZZ_unknown-region", None)]
    #[case("KR", None)]
    #[case("", None)]
    fn test_type_from_key(#[case] key: &str, #[case] expected: Option<WorkType>) {
        assert_eq!(WorkType::from_key(key), expected);
    }

    #[rstest]
    #[case("Manhwa", WorkType::Manhwa)]
    #[case(" webtoon ", WorkType::Manhwa)]
    #[case("doujinshi", WorkType::Other("doujinshi".to_string()))]
    fn test_type_from_str(#[case] input: &str, #[case] expected: WorkType) {
        assert_eq!(input.parse::<WorkType>().unwrap(), expected);
    }

    fn entry(key: &str, title: &str, chapters: Vec<(&str, ChapterStub)>) -> CatalogIndexEntry {
        CatalogIndexEntry {
            key: key.to_string(),
            title: title.to_string(),
            chapters: Chapters::new(chapters.into_iter().map(|(k, c)| (k.to_string(), c)).collect()),
        }
    }

    #[test]
    fn test_projection_infers_type_from_key() {
        let stub = ChapterStub {
            url: Some("https://cubari.moe/read/gist/abc".to_string()),
            cover_url: Some("https://img.example/cover.jpg".to_string()),
            ..Default::default()
        };
        let light = LightIndexEntry::from(&entry("KR_tower", "Tower of God", vec![("1", stub)]));
        assert_eq!(light.work_type, WorkType::Manhwa);
        assert_eq!(light.cover_url.as_deref(), Some("https://img.example/cover.jpg"));
        assert_eq!(light.url.as_deref(), Some("https://cubari.moe/read/gist/abc"));
    }

    #[test]
    fn test_projection_prefers_explicit_type() {
        let stub = ChapterStub { work_type: Some("novel".to_string()), ..Default::default() };
        let light = LightIndexEntry::from(&entry("KR_tower", "Tower of God", vec![("1", stub)]));
        assert_eq!(light.work_type, WorkType::Novel);
        assert_eq!(light.url, None);
    }

    #[test]
    fn test_projection_falls_back_to_chapter_title_then_key() {
        let stub = ChapterStub { title: Some("Chapter Title".to_string()), ..Default::default() };
        assert_eq!(LightIndexEntry::from(&entry("XX_a", " ", vec![("1", stub)])).title, "Chapter Title");
        assert_eq!(LightIndexEntry::from(&entry("XX_a", "", vec![])).title, "XX_a");
    }

    #[test]
    fn test_serde_shape() {
        let light = LightIndexEntry {
            id: "JP_x".to_string(),
            title: "X".to_string(),
            work_type: WorkType::Manga,
            cover_url: None,
            url: None,
        };
        let json = serde_json::to_value(&light).unwrap();
        assert_eq!(json["type"], "manga");
        assert!(json.get("coverUrl").is_some());
    }
}
