//! Per-file work: plan (hash, id, timestamp, paths), then materialize.

use std::path::{Path, PathBuf};

use crate::date::json::MetaIndex;
use crate::date::{iso_millis, resolve_timestamp, Plausibility, Resolution};
use crate::dedup::{short_hash, stable_id};
use crate::layout::OutputLayout;
use crate::manifest::{relative_url, ManifestEntry};
use crate::media::{MediaFile, MediaKind};
use crate::tools::Toolchain;
use crate::transcode::{transcode_image, transcode_video, video_poster};

/// A discovered file with everything decided except the encoding itself.
#[derive(Debug, Clone)]
pub struct Job {
    pub file: MediaFile,
    pub id: String,
    pub resolution: Resolution,
    pub main: PathBuf,
    pub thumb: PathBuf,
}

/// A file that produced no manifest entry, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct Skip {
    pub path: PathBuf,
    pub reason: String,
}

impl Skip {
    fn new(path: &Path, reason: String) -> Self {
        Self {
            path: path.to_path_buf(),
            reason,
        }
    }
}

pub fn plan(
    mut file: MediaFile,
    index: &MetaIndex,
    tools: &dyn Toolchain,
    window: &Plausibility,
    layout: &OutputLayout,
) -> Result<Job, Skip> {
    let hash = short_hash(&file.path)
        .map_err(|e| Skip::new(&file.path, format!("hash failed: {}", e)))?;
    let id = stable_id(file.stem(), &hash);

    let resolution = resolve_timestamp(&file, index, tools, window)
        .map_err(|e| Skip::new(&file.path, format!("timestamp failed: {:#}", e)))?;
    log::debug!(
        "{}: {} via {}",
        file.filename,
        iso_millis(resolution.timestamp_ms),
        resolution.source.tag()
    );

    let (main, thumb) = layout.paths(file.kind, &id, resolution.timestamp_ms);
    file.short_hash = Some(hash);
    file.timestamp_ms = Some(resolution.timestamp_ms);

    Ok(Job {
        file,
        id,
        resolution,
        main,
        thumb,
    })
}

/// Produce the job's outputs unless they already exist, then describe them.
pub fn materialize(
    job: &Job,
    tools: &dyn Toolchain,
    layout: &OutputLayout,
    force: bool,
) -> Result<ManifestEntry, Skip> {
    let src = &job.file.path;

    if !force && job.main.exists() && job.thumb.exists() {
        log::debug!("{}: outputs present, skipping", job.file.filename);
    } else {
        match job.file.kind {
            MediaKind::Image => transcode_image(tools, src, &job.main, &job.thumb)
                .map_err(|e| Skip::new(src, format!("image process failed: {:#}", e)))?,
            MediaKind::Video => {
                let step = transcode_video(tools, src, &job.main)
                    .map_err(|failure| Skip::new(src, format!("video process failed: {}", failure)))?;
                if step != "transcode" {
                    log::info!("{}: recovered via {}", job.file.filename, step);
                }
                video_poster(tools, src, &job.main, &job.thumb);
            }
        }
        stamp_mtime(&job.main, job.resolution.timestamp_ms);
        stamp_mtime(&job.thumb, job.resolution.timestamp_ms);
    }

    Ok(ManifestEntry::new(
        job.id.clone(),
        job.file.kind,
        relative_url(layout.root(), &job.main),
        relative_url(layout.root(), &job.thumb),
        job.resolution.timestamp_ms,
        job.resolution.source,
        job.resolution.caption.clone(),
    ))
}

fn stamp_mtime(path: &Path, timestamp_ms: i64) {
    let secs = timestamp_ms.div_euclid(1000);
    let nanos = (timestamp_ms.rem_euclid(1000) * 1_000_000) as u32;
    let ft = filetime::FileTime::from_unix_time(secs, nanos);
    filetime::set_file_mtime(path, ft).ok();
}
