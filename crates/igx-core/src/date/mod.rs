pub mod json;
pub mod path;

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::media::{MediaFile, MediaKind};
use crate::tools::Toolchain;
use json::MetaIndex;

/// 2010-01-01T00:00:00Z
pub const MIN_PLAUSIBLE_MS: i64 = 1_262_304_000_000;
const FUTURE_SLACK_MS: i64 = 3 * 24 * 60 * 60 * 1000;

/// Where a resolved timestamp came from, most to least trustworthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateSource {
    #[serde(rename = "json:basename")]
    JsonBasename,
    #[serde(rename = "json:numeric")]
    JsonNumericToken,
    #[serde(rename = "probe:creation_time")]
    ContainerProbe,
    #[serde(rename = "folder:yyyymm")]
    FolderDate,
    #[serde(rename = "fs:mtime")]
    FileMtime,
}

impl DateSource {
    pub fn tag(&self) -> &'static str {
        match self {
            DateSource::JsonBasename => "json:basename",
            DateSource::JsonNumericToken => "json:numeric",
            DateSource::ContainerProbe => "probe:creation_time",
            DateSource::FolderDate => "folder:yyyymm",
            DateSource::FileMtime => "fs:mtime",
        }
    }
}

/// Accepted range for every cascade stage except the mtime fallback.
#[derive(Debug, Clone, Copy)]
pub struct Plausibility {
    pub min_ms: i64,
    pub max_ms: i64,
}

impl Plausibility {
    pub fn at(now_ms: i64) -> Self {
        Self {
            min_ms: MIN_PLAUSIBLE_MS,
            max_ms: now_ms + FUTURE_SLACK_MS,
        }
    }

    pub fn now() -> Self {
        Self::at(Utc::now().timestamp_millis())
    }

    pub fn accepts(&self, ms: i64) -> bool {
        (self.min_ms..=self.max_ms).contains(&ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub timestamp_ms: i64,
    pub source: DateSource,
    /// Caption of the first metadata record matched, empty when none matched
    pub caption: String,
}

/// Pick one timestamp for a media file.
///
/// Cascade: exact basename in the index, numeric token in the index, container
/// creation time (video only), `media/<posts|reels>/YYYYMM/` folder, file mtime.
/// Each stage but the last is used only when its value is plausible.
/// Errors only when the file's own metadata cannot be read.
pub fn resolve_timestamp(
    file: &MediaFile,
    index: &MetaIndex,
    tools: &dyn Toolchain,
    window: &Plausibility,
) -> anyhow::Result<Resolution> {
    let basename_hit = index.by_basename.get(&file.filename);
    let token_hit = path::numeric_tokens(&file.filename)
        .into_iter()
        .find_map(|token| index.by_numeric_token.get(token));

    let caption = basename_hit
        .or(token_hit)
        .map(|e| e.caption.clone())
        .unwrap_or_default();

    let resolved = |timestamp_ms: i64, source: DateSource| Resolution {
        timestamp_ms,
        source,
        caption: caption.clone(),
    };

    if let Some(ms) = basename_hit.and_then(|e| e.timestamp_ms).filter(|ms| window.accepts(*ms)) {
        return Ok(resolved(ms, DateSource::JsonBasename));
    }

    // Only the first token present in the index is consulted
    if let Some(ms) = token_hit.and_then(|e| e.timestamp_ms).filter(|ms| window.accepts(*ms)) {
        return Ok(resolved(ms, DateSource::JsonNumericToken));
    }

    if file.kind == MediaKind::Video {
        match tools.probe(&file.path) {
            Ok(info) => {
                if let Some(ms) = info
                    .creation_time
                    .as_deref()
                    .and_then(parse_container_date)
                    .filter(|ms| window.accepts(*ms))
                {
                    return Ok(resolved(ms, DateSource::ContainerProbe));
                }
            }
            Err(e) => log::debug!("probe failed for {}: {}", file.path.display(), e),
        }
    }

    if let Some(ms) = path::folder_date_ms(&file.path).filter(|ms| window.accepts(*ms)) {
        return Ok(resolved(ms, DateSource::FolderDate));
    }

    Ok(resolved(file_mtime_ms(&file.path)?, DateSource::FileMtime))
}

/// Parse a container `creation_time` tag. Zone-less values are taken as UTC.
pub fn parse_container_date(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
}

pub fn file_mtime_ms(path: &Path) -> anyhow::Result<i64> {
    let meta = std::fs::metadata(path)?;
    let ft = filetime::FileTime::from_last_modification_time(&meta);
    Ok(ft.unix_seconds() * 1000 + i64::from(ft.nanoseconds() / 1_000_000))
}

/// ISO-8601 UTC with milliseconds, e.g. `2023-11-14T22:13:20.000Z`.
pub fn iso_millis(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::json::MetaEntry;
    use crate::tools::fake::ScriptedTools;
    use crate::tools::ProbeInfo;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    /// 2026-01-01T00:00:00Z
    const NOW: i64 = 1_767_225_600_000;

    fn window() -> Plausibility {
        Plausibility::at(NOW)
    }

    fn entry(ms: i64, caption: &str) -> MetaEntry {
        MetaEntry {
            timestamp_ms: Some(ms),
            caption: caption.to_string(),
        }
    }

    fn touch(path: &Path, mtime_secs: i64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
        filetime::set_file_mtime(path, filetime::FileTime::from_unix_time(mtime_secs, 0)).unwrap();
    }

    fn file_at(path: PathBuf) -> MediaFile {
        let kind = MediaKind::from_path(&path).unwrap();
        MediaFile::new(path, kind)
    }

    #[test]
    fn test_basename_match_wins_regardless_of_folder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("anywhere/else/abc123456789012.jpg");
        touch(&path, 1_600_000_000);

        let mut index = MetaIndex::default();
        index.insert("abc123456789012.jpg", entry(1_700_000_000_000, "hello"));

        let r = resolve_timestamp(&file_at(path), &index, &ScriptedTools::new(), &window()).unwrap();
        assert_eq!(r.timestamp_ms, 1_700_000_000_000);
        assert_eq!(r.source, DateSource::JsonBasename);
        assert_eq!(r.caption, "hello");
    }

    #[test]
    fn test_numeric_token_match() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("media/posts/202001/renamed_123456789012_n.jpg");
        touch(&path, 1_600_000_000);

        let mut index = MetaIndex::default();
        index.insert("orig_123456789012.jpg", entry(1_650_000_000_000, "token"));

        let r = resolve_timestamp(&file_at(path), &index, &ScriptedTools::new(), &window()).unwrap();
        assert_eq!(r.timestamp_ms, 1_650_000_000_000);
        assert_eq!(r.source, DateSource::JsonNumericToken);
        assert_eq!(r.caption, "token");
    }

    #[test]
    fn test_implausible_candidates_fall_through() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("media/posts/202106/p_1234567890123.jpg");
        touch(&path, 1_600_000_000);

        let mut index = MetaIndex::default();
        // epoch zero, before 2010, and far future are all rejected
        index.insert("p_1234567890123.jpg", entry(0, ""));
        index.by_numeric_token.insert("1234567890123".into(), entry(1_000_000_000_000, ""));

        let r = resolve_timestamp(&file_at(path.clone()), &index, &ScriptedTools::new(), &window()).unwrap();
        assert_eq!(r.source, DateSource::FolderDate);
        assert_eq!(iso_millis(r.timestamp_ms), "2021-06-15T12:00:00.000Z");

        let mut future = MetaIndex::default();
        future.insert("p_1234567890123.jpg", entry(NOW + 4 * 24 * 3600 * 1000, ""));
        let r = resolve_timestamp(&file_at(path), &future, &ScriptedTools::new(), &window()).unwrap();
        assert_eq!(r.source, DateSource::FolderDate);
    }

    #[test]
    fn test_probe_used_for_video_only() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("media/reels/202305/clip.mp4");
        let image = dir.path().join("media/reels/202305/clip.jpg");
        touch(&video, 1_600_000_000);
        touch(&image, 1_600_000_000);

        let tools = ScriptedTools::new().with_probe(
            "clip.mp4",
            ProbeInfo {
                has_video: true,
                has_audio: true,
                creation_time: Some("2023-05-20T08:30:00.000000Z".into()),
            },
        );
        let index = MetaIndex::default();

        let r = resolve_timestamp(&file_at(video), &index, &tools, &window()).unwrap();
        assert_eq!(r.source, DateSource::ContainerProbe);
        assert_eq!(iso_millis(r.timestamp_ms), "2023-05-20T08:30:00.000Z");

        let r = resolve_timestamp(&file_at(image), &index, &tools, &window()).unwrap();
        assert_eq!(r.source, DateSource::FolderDate);
        assert_eq!(tools.probe_count(), 1);
    }

    #[test]
    fn test_epoch_zero_probe_rejected() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("media/reels/202305/zero.mp4");
        touch(&video, 1_600_000_000);
        let tools = ScriptedTools::new().with_probe(
            "zero.mp4",
            ProbeInfo {
                has_video: true,
                has_audio: false,
                creation_time: Some("1970-01-01T00:00:00.000000Z".into()),
            },
        );
        let r = resolve_timestamp(&file_at(video), &MetaIndex::default(), &tools, &window()).unwrap();
        assert_eq!(r.source, DateSource::FolderDate);
        assert_eq!(iso_millis(r.timestamp_ms), "2023-05-15T12:00:00.000Z");
    }

    #[test]
    fn test_mtime_fallback_skips_plausibility() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("loose/old.png");
        // 2005, outside the window, still used
        touch(&path, 1_120_000_000);
        let r = resolve_timestamp(&file_at(path), &MetaIndex::default(), &ScriptedTools::new(), &window()).unwrap();
        assert_eq!(r.source, DateSource::FileMtime);
        assert_eq!(r.timestamp_ms, 1_120_000_000_000);
        assert_eq!(r.caption, "");
    }

    #[test]
    fn test_parse_container_date() {
        assert_eq!(parse_container_date("2023-11-14T22:13:20Z"), Some(1_700_000_000_000));
        assert_eq!(parse_container_date("2023-11-14T22:13:20.000000Z"), Some(1_700_000_000_000));
        assert_eq!(parse_container_date("2023-11-14 22:13:20"), Some(1_700_000_000_000));
        assert_eq!(parse_container_date("yesterday"), None);
    }

    #[test]
    fn test_iso_millis() {
        assert_eq!(iso_millis(1_700_000_000_000), "2023-11-14T22:13:20.000Z");
    }
}
