use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::error::ErrorKind;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use igx_core::{EncodeSettings, Ffmpeg, ProcessOptions};

#[derive(Parser)]
#[command(
    name = "igx",
    version,
    about = "Ingest an Instagram data export into web-ready media and a JSON manifest"
)]
struct Cli {
    /// Extracted export directory
    #[arg(long = "in", value_name = "DIR")]
    input: PathBuf,

    /// Site root for assets, media.json and skipped.log
    #[arg(long = "out", value_name = "DIR")]
    output: PathBuf,

    /// Re-encode even when outputs already exist
    #[arg(long)]
    force: bool,

    /// Worker threads (default: available cores)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Organize assets into YYYY/MM subdirectories
    #[arg(long)]
    divide_to_dates: bool,

    /// Comma-separated folder names to skip (default: messages,inbox,direct)
    #[arg(long, value_delimiter = ',')]
    exclude_dirs: Option<Vec<String>>,

    /// JSON file overriding encoder settings
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
            e.print().ok();
            return code;
        }
    };

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let t_total = std::time::Instant::now();

    let settings = match &cli.settings {
        Some(path) => EncodeSettings::load(path)?,
        None => EncodeSettings::default(),
    };

    let mut options = ProcessOptions::new(cli.input, cli.output);
    options.force = cli.force;
    options.divide_to_dates = cli.divide_to_dates;
    if let Some(n) = cli.concurrency {
        anyhow::ensure!(n > 0, "--concurrency must be at least 1");
        options.concurrency = n;
    }
    if let Some(dirs) = cli.exclude_dirs {
        options.exclude_dirs = dirs
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
    }
    options.settings = settings.clone();

    let tools = Ffmpeg::from_env(settings);

    let bar = if cli.no_progress {
        None
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40}] {pos}/{len} {prefix} {wide_msg}")
                .map_err(|e| anyhow::anyhow!("progress template: {}", e))?,
        );
        Some(pb)
    };
    let stage_seen = Mutex::new(String::new());

    let cb_bar = bar.clone();
    let result = igx_core::process(&options, &tools, &move |stage, current, total, message| {
        let Some(pb) = &cb_bar else {
            return;
        };
        if let Ok(mut seen) = stage_seen.lock() {
            if seen.as_str() != stage {
                *seen = stage.to_string();
                pb.reset();
                pb.set_prefix(stage.to_string());
            }
        }
        pb.set_length(total);
        pb.set_position(current + 1);
        pb.set_message(message.to_string());
    });

    if let Some(pb) = &bar {
        pb.finish_and_clear();
    }
    let result = result?;

    eprintln!(
        "Done! {} images, {} videos, {} skipped, {} duplicates dropped ({:.2}s)",
        result.images,
        result.videos,
        result.files_skipped,
        result.duplicates_removed,
        t_total.elapsed().as_secs_f64()
    );
    for (year, count) in &result.by_year {
        eprintln!("  {}: {}", year, count);
    }
    eprintln!("Manifest: {}", result.manifest_path.display());
    if result.files_skipped > 0 {
        eprintln!("Skip log: {}", result.skip_log_path.display());
    }

    Ok(())
}
