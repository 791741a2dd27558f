use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt::{Formatter, Result as FmtResult};

/// A single chapter entry, as found in both the remote index and a work's
/// detail document.
///
/// `last_updated` is Unix seconds. Upstream data is inconsistent about its
/// type, so integers, floats and numeric strings are all accepted; anything
/// missing or unparseable becomes `0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterStub {
    /// Indirection pointer to the work's detail document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default, deserialize_with = "flexible_seconds")]
    pub last_updated: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub work_type: Option<String>,
}

fn flexible_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
        Null(()),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Int(i) => i,
        // Truncation towards zero is intended: sub-second precision is noise.
        Raw::Float(f) if f.is_finite() => f as i64,
        Raw::Text(s) => {
            let s = s.trim();
            s.parse::<i64>().or_else(|_| s.parse::<f64>().map(|f| f as i64)).unwrap_or(0)
        },
        Raw::Float(_) | Raw::Null(()) => 0,
    })
}

/// Chapters keyed by chapter key, in document order.
///
/// JSON objects are unordered in principle, but "first seen wins" tie-breaking
/// needs the order the remote document was written in, so this keeps the pairs
/// in a `Vec` rather than a hash map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chapters(Vec<(String, ChapterStub)>);

impl Chapters {
    pub fn new(pairs: Vec<(String, ChapterStub)>) -> Self {
        Self(pairs)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChapterStub)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, key: &str) -> Option<&ChapterStub> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// The chapter with the greatest `last_updated`; ties go to the first seen.
    pub fn latest(&self) -> Option<(&str, &ChapterStub)> {
        self.iter().fold(None, |best, (key, chapter)| match best {
            Some((_, b)) if b.last_updated >= chapter.last_updated => best,
            _ => Some((key, chapter)),
        })
    }

    /// The first chapter that carries an indirection pointer.
    pub fn first_addressable(&self) -> Option<&ChapterStub> {
        self.0.iter().map(|(_, c)| c).find(|c| c.url.as_deref().is_some_and(|u| !u.trim().is_empty()))
    }

    /// The first chapter that carries a cover image.
    pub fn first_cover(&self) -> Option<&str> {
        self.0.iter().find_map(|(_, c)| c.cover_url.as_deref().filter(|u| !u.is_empty()))
    }
}

impl Serialize for Chapters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, chapter) in &self.0 {
            map.serialize_entry(key, chapter)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Chapters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;
        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = Chapters;

            fn expecting(&self, f: &mut Formatter<'_>) -> FmtResult {
                f.write_str("a map of chapter keys to chapter entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, chapter)) = access.next_entry::<String, ChapterStub>()? {
                    // Duplicate keys: last write wins, position of the first is kept.
                    match pairs.iter_mut().find(|pair: &&mut (String, ChapterStub)| pair.0 == key) {
                        Some(existing) => existing.1 = chapter,
                        None => pairs.push((key, chapter)),
                    }
                }
                Ok(Chapters(pairs))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(Chapters::default())
            }
        }
        deserializer.deserialize_any(OrderedVisitor)
    }
}
