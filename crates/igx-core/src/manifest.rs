use std::cmp::Ordering;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::date::{iso_millis, DateSource};
use crate::dedup::keep_first_by;
use crate::media::MediaKind;

pub const MANIFEST_FILENAME: &str = "media.json";
pub const SKIP_LOG_FILENAME: &str = "skipped.log";

/// One ingested item as the site reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub kind: MediaKind,
    /// Main asset, relative to the output root
    pub src: String,
    /// Thumbnail or poster, relative to the output root
    pub thumb: String,
    /// ISO-8601 UTC, millisecond precision
    pub date: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub source: DateSource,
    pub caption: String,
    pub hidden: bool,
}

impl ManifestEntry {
    pub fn new(
        id: String,
        kind: MediaKind,
        src: String,
        thumb: String,
        timestamp_ms: i64,
        source: DateSource,
        caption: String,
    ) -> Self {
        Self {
            id,
            kind,
            src,
            thumb,
            date: iso_millis(timestamp_ms),
            timestamp: timestamp_ms,
            source,
            caption,
            hidden: false,
        }
    }
}

/// Newest first; equal timestamps ordered by id, descending.
pub fn compare_entries(a: &ManifestEntry, b: &ManifestEntry) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| b.id.cmp(&a.id))
}

/// Drop later (kind, src) duplicates, then sort. Returns the number dropped.
pub fn finalize(entries: &mut Vec<ManifestEntry>) -> usize {
    let dropped = keep_first_by(entries, |e| (e.kind, e.src.clone()));
    entries.sort_by(compare_entries);
    dropped
}

/// Write the manifest as pretty JSON, via a temp file and rename.
pub fn write_manifest(entries: &[ManifestEntry], path: &Path) -> anyhow::Result<()> {
    let temp_path = path.with_extension("json.tmp");
    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, entries)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Path of `target` relative to `root`, `/`-separated.
pub fn relative_url(root: &Path, target: &Path) -> String {
    pathdiff::diff_paths(target, root)
        .unwrap_or_else(|| target.to_path_buf())
        .to_string_lossy()
        .replace('\\', "/")
}

/// Append-only diagnostics for files that produced no manifest entry.
/// Safe to share between worker threads.
pub struct SkipLog {
    path: PathBuf,
    file: Mutex<File>,
    count: AtomicU64,
}

impl SkipLog {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            count: AtomicU64::new(0),
        })
    }

    /// One line per skipped file: `<iso time>\t<reason>\t<source path>`.
    pub fn record(&self, source: &Path, reason: &str) {
        log::warn!("skipped {}: {}", source.display(), reason);
        let line = format!(
            "{}\t{}\t{}\n",
            iso_millis(chrono::Utc::now().timestamp_millis()),
            reason.replace(['\t', '\n'], " "),
            source.display()
        );

        let mut file = match self.file.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = file.write_all(line.as_bytes()) {
            log::error!("cannot write {}: {}", self.path.display(), e);
        }
        drop(file);

        self.count.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Number of records written by this run.
    pub fn count(&self) -> u64 {
        self.count.load(AtomicOrdering::Relaxed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
