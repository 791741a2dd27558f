use std::collections::HashSet;
use tsundoku_model::{ChapterChange, FullRecord, UpdateKind, UpdateRecord, seconds_to_millis};

/// Classify every work of `new` against the `old` snapshot.
///
/// A work whose key is absent from `old` is a new work. For a known work,
/// each chapter whose `last_updated` lies after `last_check_ms` counts as
/// new; chapter keys themselves are never compared, so a backdated or
/// silently edited chapter goes unnoticed. Failure records on either side
/// are ignored.
///
/// Updates, and the chapters within each one, are ordered newest first.
pub fn diff(old: &[FullRecord], new: &[FullRecord], last_check_ms: i64) -> Vec<UpdateRecord> {
    let known: HashSet<&str> = old.iter().filter(|r| !r.is_error()).map(FullRecord::key).collect();
    let mut updates = Vec::new();
    for record in new.iter().filter(|r| !r.is_error()) {
        if !known.contains(record.key()) {
            updates.push(UpdateRecord {
                kind: UpdateKind::NewWork,
                work: record.clone(),
                new_chapters: Vec::new(),
                timestamp: record.last_updated,
            });
            continue;
        }
        let mut chapters: Vec<ChapterChange> = record
            .chapters
            .iter()
            .map(|(key, chapter)| (key, chapter, seconds_to_millis(chapter.last_updated)))
            .filter(|(_, _, timestamp)| *timestamp > last_check_ms)
            .map(|(key, chapter, timestamp)| ChapterChange {
                title: chapter.title.clone().unwrap_or_else(|| format!("Chapter {key}")),
                timestamp,
                key: key.to_string(),
            })
            .collect();
        if chapters.is_empty() {
            continue;
        }
        chapters.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let timestamp = chapters[0].timestamp;
        updates.push(UpdateRecord { kind: UpdateKind::NewChapters, work: record.clone(), new_chapters: chapters, timestamp });
    }
    updates.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    tracing::debug!(updates = updates.len(), last_check_ms, "Diffed catalog snapshots");
    updates
}
