pub mod date;
pub mod dedup;
pub mod error;
pub mod layout;
pub mod manifest;
pub mod media;
pub mod pipeline;
pub mod scan;
pub mod settings;
pub mod tools;
pub mod transcode;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub use error::IngestError;
pub use manifest::{ManifestEntry, MANIFEST_FILENAME, SKIP_LOG_FILENAME};
pub use media::MediaKind;
pub use settings::EncodeSettings;
pub use tools::ffmpeg::Ffmpeg;
pub use tools::Toolchain;

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_exclude_dirs() -> Vec<String> {
    ["messages", "inbox", "direct"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Root of the extracted export
    pub input: PathBuf,
    /// Site root receiving assets, manifest and skip log
    pub output: PathBuf,
    /// Re-encode even when outputs already exist
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Insert YYYY/MM below each asset folder
    #[serde(default)]
    pub divide_to_dates: bool,
    /// Folder names skipped during discovery, besides the recently-deleted subtree
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
    #[serde(default)]
    pub settings: EncodeSettings,
}

impl ProcessOptions {
    pub fn new(input: PathBuf, output: PathBuf) -> Self {
        Self {
            input,
            output,
            force: false,
            concurrency: default_concurrency(),
            divide_to_dates: false,
            exclude_dirs: default_exclude_dirs(),
            settings: EncodeSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    /// Final, deduplicated and sorted manifest as written
    pub manifest: Vec<ManifestEntry>,
    pub total_media: u64,
    pub images: u64,
    pub videos: u64,
    pub files_skipped: u64,
    pub duplicates_removed: u64,
    pub by_year: BTreeMap<i32, u64>,
    pub manifest_path: PathBuf,
    pub skip_log_path: PathBuf,
}

/// Type alias for progress callback
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Minimum gap between forwarded progress updates
const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Rate-limits a progress callback. The final update of a stage always goes through.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    interval: Duration,
    last_emit: Mutex<Option<Instant>>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        Self::with_interval(inner, PROGRESS_INTERVAL)
    }

    pub fn with_interval(inner: &'a ProgressCallback, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            last_emit: Mutex::new(None),
        }
    }

    fn due(&self) -> bool {
        let mut last = match self.last_emit.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        if last.is_some_and(|t| now.duration_since(t) < self.interval) {
            return false;
        }
        *last = Some(now);
        true
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        if current + 1 >= total || self.due() {
            (self.inner)(stage, current, total, message);
        }
    }
}

/// Run the full ingest: index metadata, discover media, resolve timestamps,
/// transcode, and write the manifest.
pub fn process(
    options: &ProcessOptions,
    tools: &dyn Toolchain,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<ProcessResult> {
    let tp = ThrottledProgress::new(progress_callback);

    // Fatal checks, before any per-file work.
    // Folder dates are matched on absolute paths, so a relative input is resolved first.
    let input = std::fs::canonicalize(&options.input)
        .ok()
        .filter(|p| p.is_dir())
        .ok_or_else(|| IngestError::InputMissing(options.input.clone()))?;
    tools.check_available().map_err(IngestError::from)?;
    std::fs::create_dir_all(&options.output).map_err(|source| IngestError::OutputUncreatable {
        path: options.output.clone(),
        source,
    })?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.concurrency.max(1))
        .build()
        .map_err(|e| IngestError::Pool(e.to_string()))?;

    let skip_log = manifest::SkipLog::open(&options.output.join(SKIP_LOG_FILENAME))?;
    let layout = layout::OutputLayout::new(&options.output, options.divide_to_dates);
    let window = date::Plausibility::now();

    // Stage 1: Index export metadata (read-only from here on)
    tp.report("index", 0, 1, "Indexing export metadata");
    let index = date::json::build_index(&input);
    tp.report("index", 1, 1, &format!("{} metadata references", index.len()));

    // Stage 2: Discover media
    let exclusions = scan::Exclusions::new(&options.exclude_dirs);
    let files = scan::discover_media(&input, &exclusions);
    let total_media = files.len() as u64;

    // Stage 3: Hash, identify, resolve timestamps
    let counter = AtomicU64::new(0);
    let planned: Vec<Result<pipeline::Job, pipeline::Skip>> = pool.install(|| {
        files
            .into_par_iter()
            .map(|file| {
                let result = pipeline::plan(file, &index, tools, &window, &layout);
                let current = counter.fetch_add(1, Ordering::Relaxed);
                tp.report("plan", current, total_media, "Resolving timestamps");
                result
            })
            .collect()
    });

    let mut jobs = Vec::with_capacity(planned.len());
    for result in planned {
        match result {
            Ok(job) => jobs.push(job),
            Err(skip) => skip_log.record(&skip.path, &skip.reason),
        }
    }

    // Stage 4: Drop jobs that would write the same output, first in path order wins
    let mut duplicates_removed =
        dedup::keep_first_by(&mut jobs, |j| (j.file.kind, j.main.clone())) as u64;
    if duplicates_removed > 0 {
        log::info!("{} duplicate file(s) dropped", duplicates_removed);
    }

    // Stage 5: Transcode
    let job_total = jobs.len() as u64;
    let counter = AtomicU64::new(0);
    let outcomes: Vec<Result<ManifestEntry, pipeline::Skip>> = pool.install(|| {
        jobs.par_iter()
            .map(|job| {
                let result = pipeline::materialize(job, tools, &layout, options.force);
                let current = counter.fetch_add(1, Ordering::Relaxed);
                tp.report("transcode", current, job_total, &job.file.filename);
                result
            })
            .collect()
    });

    let mut entries = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            Ok(entry) => entries.push(entry),
            Err(skip) => skip_log.record(&skip.path, &skip.reason),
        }
    }

    // Stage 6: Manifest
    duplicates_removed += manifest::finalize(&mut entries) as u64;
    let manifest_path = options.output.join(MANIFEST_FILENAME);
    manifest::write_manifest(&entries, &manifest_path)?;
    tp.report("manifest", 0, 1, "Manifest written");

    let mut by_year: BTreeMap<i32, u64> = BTreeMap::new();
    let mut images = 0u64;
    let mut videos = 0u64;
    for entry in &entries {
        match entry.kind {
            MediaKind::Image => images += 1,
            MediaKind::Video => videos += 1,
        }
        if let Some(dt) = DateTime::from_timestamp_millis(entry.timestamp) {
            *by_year.entry(dt.year()).or_default() += 1;
        }
    }

    log::info!(
        "manifest: {} images, {} videos, {} skipped -> {}",
        images,
        videos,
        skip_log.count(),
        manifest_path.display()
    );

    Ok(ProcessResult {
        manifest: entries,
        total_media,
        images,
        videos,
        files_skipped: skip_log.count(),
        duplicates_removed,
        by_year,
        manifest_path,
        skip_log_path: skip_log.path().to_path_buf(),
    })
}
