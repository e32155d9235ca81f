use std::path::{Path, PathBuf};

use chrono::DateTime;

use crate::media::MediaKind;

const IMAGE_FULL_DIR: &str = "assets/media/img/full";
const IMAGE_THUMB_DIR: &str = "assets/media/img/thumbs";
const VIDEO_DIR: &str = "assets/media/video/720p";
const VIDEO_POSTER_DIR: &str = "assets/media/video/posters";

/// Where derived assets go under the output root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    divide_to_dates: bool,
}

impl OutputLayout {
    pub fn new(root: &Path, divide_to_dates: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            divide_to_dates,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// (main asset, thumbnail or poster) for one item.
    pub fn paths(&self, kind: MediaKind, id: &str, timestamp_ms: i64) -> (PathBuf, PathBuf) {
        let (main_dir, thumb_dir, main_ext, thumb_ext) = match kind {
            MediaKind::Image => (IMAGE_FULL_DIR, IMAGE_THUMB_DIR, "webp", "webp"),
            MediaKind::Video => (VIDEO_DIR, VIDEO_POSTER_DIR, "mp4", "jpg"),
        };
        let main = self.dated(main_dir, timestamp_ms).join(format!("{}.{}", id, main_ext));
        let thumb = self.dated(thumb_dir, timestamp_ms).join(format!("{}.{}", id, thumb_ext));
        (main, thumb)
    }

    fn dated(&self, dir: &str, timestamp_ms: i64) -> PathBuf {
        let base = self.root.join(dir);
        if !self.divide_to_dates {
            return base;
        }
        match DateTime::from_timestamp_millis(timestamp_ms) {
            Some(dt) => base
                .join(dt.format("%Y").to_string())
                .join(dt.format("%m").to_string()),
            None => base.join("date-unknown"),
        }
    }
}
