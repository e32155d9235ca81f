use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use walkdir::WalkDir;

use super::path::{numeric_tokens, reference_basename};
use crate::media::is_media_name;

static METADATA_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(posts|archived_posts|reels|stories|igtv_videos|videos|profile_photos)(_\d+)?\.json$",
    )
    .unwrap()
});

/// Keys checked for a timestamp, in priority order
const TIMESTAMP_KEYS: &[&str] = &["creation_timestamp", "taken_at", "timestamp", "creation_time", "date"];

/// Keys checked for caption text, in priority order
const CAPTION_KEYS: &[&str] = &["title", "caption", "description"];

/// Numbers with fewer digits than this are whole seconds
const MILLIS_DIGITS: usize = 13;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaEntry {
    pub timestamp_ms: Option<i64>,
    pub caption: String,
}

/// Lookup tables built from the export's JSON records.
/// First-seen-wins: a later record only fills fields the first one lacked.
#[derive(Debug, Default)]
pub struct MetaIndex {
    pub by_basename: HashMap<String, MetaEntry>,
    pub by_numeric_token: HashMap<String, MetaEntry>,
}

impl MetaEntry {
    /// Take the later record's timestamp only while this entry has none.
    fn fill_from(&mut self, later: &MetaEntry) {
        if self.timestamp_ms.is_some() || later.timestamp_ms.is_none() {
            return;
        }
        self.timestamp_ms = later.timestamp_ms;
        if self.caption.is_empty() {
            self.caption = later.caption.clone();
        }
    }
}

fn absorb(map: &mut HashMap<String, MetaEntry>, key: &str, entry: &MetaEntry) {
    match map.get_mut(key) {
        Some(existing) => existing.fill_from(entry),
        None => {
            map.insert(key.to_string(), entry.clone());
        }
    }
}

impl MetaIndex {
    pub fn insert(&mut self, basename: &str, entry: MetaEntry) {
        for token in numeric_tokens(basename) {
            absorb(&mut self.by_numeric_token, token, &entry);
        }
        absorb(&mut self.by_basename, basename, &entry);
    }

    pub fn len(&self) -> usize {
        self.by_basename.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_basename.is_empty()
    }
}

/// Check whether a file name looks like an export record collection (posts_1.json, reels.json, ...)
pub fn is_metadata_file(name: &str) -> bool {
    METADATA_FILE_RE.is_match(name)
}

/// Scan every recognized metadata JSON file under the export root.
/// Unreadable or malformed files are logged and skipped.
pub fn build_index(export_root: &Path) -> MetaIndex {
    let mut index = MetaIndex::default();
    let mut files = 0usize;

    for entry in WalkDir::new(export_root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !is_metadata_file(&name) {
            continue;
        }

        let result = std::fs::read(entry.path())
            .map_err(anyhow::Error::from)
            .and_then(|bytes| index_json_bytes(&bytes, &mut index));
        match result {
            Ok(refs) => {
                files += 1;
                log::debug!("indexed {} media references from {}", refs, entry.path().display());
            }
            Err(e) => log::warn!("skipping metadata file {}: {}", entry.path().display(), e),
        }
    }

    log::info!(
        "metadata index: {} basenames, {} numeric tokens from {} files",
        index.by_basename.len(),
        index.by_numeric_token.len(),
        files
    );
    index
}

/// Parse one metadata file and add its media references to the index.
/// Returns the number of media references seen.
pub fn index_json_bytes(bytes: &[u8], index: &mut MetaIndex) -> anyhow::Result<usize> {
    let value: Value = serde_json::from_slice(bytes)?;
    let mut refs = 0usize;
    for record in records(&value) {
        walk_json(
            record,
            &NodeMeta::default(),
            &mut |map, parent| NodeMeta::from_object(map).inherit(parent),
            &mut |leaf, meta| {
                let Some(name) = reference_basename(leaf) else {
                    return;
                };
                if !is_media_name(name) {
                    return;
                }
                refs += 1;
                index.insert(
                    name,
                    MetaEntry {
                        timestamp_ms: meta.timestamp_ms,
                        caption: meta.caption.clone().unwrap_or_default(),
                    },
                );
            },
        );
    }
    Ok(refs)
}

/// A file holds either a sequence of records or an object wrapping record
/// sequences and single records (`{"ig_reels_media": [...], "photo": {...}}`).
/// An object that carries record fields itself is a single record.
fn records(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => {
            if NodeMeta::from_object(map).is_record() {
                return vec![value];
            }
            let nested: Vec<&Value> = map
                .values()
                .flat_map(|v| -> Vec<&Value> {
                    match v {
                        Value::Array(items) => items.iter().collect(),
                        Value::Object(_) => vec![v],
                        _ => Vec::new(),
                    }
                })
                .collect();
            if nested.is_empty() {
                vec![value]
            } else {
                nested
            }
        }
        _ => Vec::new(),
    }
}

/// Depth-first walk over a JSON value of any shape.
///
/// `enter` runs at every object node with the state inherited from the enclosing
/// object and returns the state its children see. `leaf` runs for every string
/// leaf with the state of its nearest enclosing object.
pub fn walk_json<S>(
    value: &Value,
    state: &S,
    enter: &mut dyn FnMut(&Map<String, Value>, &S) -> S,
    leaf: &mut dyn FnMut(&str, &S),
) {
    match value {
        Value::Object(map) => {
            let inner = enter(map, state);
            for child in map.values() {
                walk_json(child, &inner, enter, leaf);
            }
        }
        Value::Array(items) => {
            for child in items {
                walk_json(child, state, enter, leaf);
            }
        }
        Value::String(s) => leaf(s, state),
        _ => {}
    }
}

#[derive(Debug, Clone, Default)]
struct NodeMeta {
    timestamp_ms: Option<i64>,
    caption: Option<String>,
}

impl NodeMeta {
    fn from_object(map: &Map<String, Value>) -> Self {
        Self {
            timestamp_ms: timestamp_field(map),
            caption: caption_field(map),
        }
    }

    fn is_record(&self) -> bool {
        self.timestamp_ms.is_some() || self.caption.is_some()
    }

    /// Own values take precedence over the enclosing object's.
    fn inherit(self, parent: &NodeMeta) -> Self {
        Self {
            timestamp_ms: self.timestamp_ms.or(parent.timestamp_ms),
            caption: self.caption.or_else(|| parent.caption.clone()),
        }
    }
}

/// First candidate key holding a finite number, normalized to milliseconds.
fn timestamp_field(map: &Map<String, Value>) -> Option<i64> {
    TIMESTAMP_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .filter_map(numeric_value)
        .find(|n| n.is_finite())
        .map(normalize_epoch)
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.parse().ok(),
        _ => None,
    }
}

/// Values with fewer than 13 integer digits are seconds; the rest are already milliseconds.
pub fn normalize_epoch(value: f64) -> i64 {
    let digits = format!("{:.0}", value.abs().trunc()).len();
    if digits < MILLIS_DIGITS {
        (value * 1000.0).round() as i64
    } else {
        value.round() as i64
    }
}

fn caption_field(map: &Map<String, Value>) -> Option<String> {
    CAPTION_KEYS
        .iter()
        .filter_map(|key| map.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(repair_text)
}

/// The export writes UTF-8 text as one `\u00XX` escape per byte. Undo that when
/// every char fits in a byte and the bytes form valid UTF-8.
pub fn repair_text(s: &str) -> String {
    if s.is_ascii() || s.chars().any(|c| (c as u32) > 0xFF) {
        return s.to_string();
    }
    let bytes: Vec<u8> = s.chars().map(|c| c as u32 as u8).collect();
    String::from_utf8(bytes).unwrap_or_else(|_| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn index_of(json: &str) -> MetaIndex {
        let mut index = MetaIndex::default();
        index_json_bytes(json.as_bytes(), &mut index).unwrap();
        index
    }

    #[test]
    fn test_normalize_epoch_units() {
        assert_eq!(normalize_epoch(1_700_000_000.0), 1_700_000_000_000);
        assert_eq!(normalize_epoch(1_700_000_000_123.0), 1_700_000_000_123);
        assert_eq!(normalize_epoch(0.0), 0);
        assert_eq!(normalize_epoch(999_999_999_999.0), 999_999_999_999_000);
    }

    #[test]
    fn test_post_record() {
        let index = index_of(
            r#"[{"media":[{"uri":"media/posts/202311/abc123456789012.jpg","creation_timestamp":1700000000,"title":""}],
                 "title":"Sunset","creation_timestamp":1690000000}]"#,
        );
        let entry = &index.by_basename["abc123456789012.jpg"];
        assert_eq!(entry.timestamp_ms, Some(1_700_000_000_000));
        assert_eq!(entry.caption, "Sunset");
        assert_eq!(index.by_numeric_token["123456789012"].timestamp_ms, Some(1_700_000_000_000));
    }

    #[test]
    fn test_record_timestamp_applies_to_nested_refs() {
        let index = index_of(
            r#"[{"taken_at":"1600000000","deep":{"list":[["media/x/a.mp4?_nc=1"]]}}]"#,
        );
        assert_eq!(index.by_basename["a.mp4"].timestamp_ms, Some(1_600_000_000_000));
    }

    #[test]
    fn test_wrapped_record_sequence() {
        let index = index_of(
            r#"{"ig_reels_media":[{"media":[{"uri":"media/reels/202101/r1.mp4","creation_timestamp":1610000000}]}]}"#,
        );
        assert_eq!(index.by_basename["r1.mp4"].timestamp_ms, Some(1_610_000_000_000));
    }

    #[test]
    fn test_first_seen_wins() {
        let index = index_of(
            r#"[{"creation_timestamp":1500000000,"uri":"a/p.jpg"},
                {"creation_timestamp":1600000000,"uri":"b/p.jpg"}]"#,
        );
        assert_eq!(index.by_basename["p.jpg"].timestamp_ms, Some(1_500_000_000_000));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_undated_reference_does_not_shadow_later_timestamp() {
        let index = index_of(
            r#"[{"title":"no date here","uri":"a/p_1234567890.jpg"},
                {"creation_timestamp":1600000000,"title":"later","uri":"b/p_1234567890.jpg"},
                {"creation_timestamp":1700000000,"uri":"c/p_1234567890.jpg"}]"#,
        );
        let entry = &index.by_basename["p_1234567890.jpg"];
        assert_eq!(entry.timestamp_ms, Some(1_600_000_000_000));
        assert_eq!(entry.caption, "no date here");
        assert_eq!(index.by_numeric_token["1234567890"].timestamp_ms, Some(1_600_000_000_000));

        let index = index_of(
            r#"[{"uri":"a/q.jpg"},{"creation_timestamp":1600000000,"title":"dated","uri":"b/q.jpg"}]"#,
        );
        assert_eq!(index.by_basename["q.jpg"].caption, "dated");
    }

    #[test]
    fn test_wrapper_with_single_record_object() {
        let index = index_of(
            r#"{"ig_reels_media":[{"creation_timestamp":1610000000,"media":[{"uri":"r1.mp4"}]}],
                "profile_photo":{"creation_timestamp":1620000000,"uri":"media/profile/pp.jpg"}}"#,
        );
        assert_eq!(index.by_basename["r1.mp4"].timestamp_ms, Some(1_610_000_000_000));
        assert_eq!(index.by_basename["pp.jpg"].timestamp_ms, Some(1_620_000_000_000));
    }

    #[test]
    fn test_skips_non_numeric_candidates() {
        let index = index_of(
            r#"[{"creation_timestamp":"soon","taken_at":1600000000,"uri":"q.png"}]"#,
        );
        assert_eq!(index.by_basename["q.png"].timestamp_ms, Some(1_600_000_000_000));
    }

    #[test]
    fn test_ignores_non_media_strings() {
        let index = index_of(r#"[{"creation_timestamp":1600000000,"uri":"x/notes.txt","t":"hello"}]"#);
        assert!(index.is_empty());
    }

    #[test]
    fn test_repair_text() {
        assert_eq!(repair_text("caf\u{00c3}\u{00a9}"), "café");
        assert_eq!(repair_text("plain"), "plain");
        assert_eq!(repair_text("already é fine ✓"), "already é fine ✓");
    }

    #[test]
    fn test_is_metadata_file() {
        assert!(is_metadata_file("posts_1.json"));
        assert!(is_metadata_file("reels.json"));
        assert!(is_metadata_file("stories.json"));
        assert!(!is_metadata_file("liked_posts.json"));
        assert!(!is_metadata_file("posts_1.html"));
    }

    #[test]
    fn test_build_index_survives_malformed_file() {
        let dir = tempdir().unwrap();
        let content = dir.path().join("your_instagram_activity").join("content");
        fs::create_dir_all(&content).unwrap();
        fs::write(content.join("posts_1.json"), "{ not json").unwrap();
        fs::write(
            content.join("posts_2.json"),
            r#"[{"creation_timestamp":1700000000,"media":[{"uri":"media/posts/202311/ok.jpg"}]}]"#,
        )
        .unwrap();
        fs::write(content.join("liked_posts.json"), r#"[{"uri":"liked.jpg"}]"#).unwrap();

        let index = build_index(dir.path());
        assert_eq!(index.len(), 1);
        assert_eq!(index.by_basename["ok.jpg"].timestamp_ms, Some(1_700_000_000_000));
    }
}
