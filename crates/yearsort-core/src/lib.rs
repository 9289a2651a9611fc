pub mod cancel;
pub mod date;
pub mod extras;
pub mod media;
pub mod scan;
pub mod sidecar;
pub mod sweep;
pub mod tools;
pub mod writer;

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::FixedOffset;
use log::{error, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::date::DateResolver;
use crate::media::MediaFile;
use crate::sidecar::{FsListing, ListingCache, ListingSource};
use crate::sweep::{Sweep, SweepSummary};
use crate::tools::exiftool::ExifTool;
use crate::tools::ffmpeg::Ffmpeg;
use crate::tools::native::NativeExif;
use crate::tools::{MetadataExtractor, MetadataWriter};
use crate::writer::{Placer, Roots};

pub use cancel::CancellationToken;

/// Name of the quarantine directory created under the output root by default.
pub const DEFAULT_QUARANTINE_DIR: &str = "date_unknown";

fn default_cutoff_days() -> u32 {
    30
}

fn default_utc_offset() -> String {
    "+09:00".to_string()
}

fn default_sweep() -> bool {
    true
}

fn default_exiftool() -> PathBuf {
    PathBuf::from("exiftool")
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Root of the extracted export
    pub input: PathBuf,
    /// Per-year folders are created here
    pub output: PathBuf,
    /// Undated files; `<output>/date_unknown` when unset
    #[serde(default)]
    pub quarantine: Option<PathBuf>,
    /// Quarantined files older than this many days are promoted by the sweep
    #[serde(default = "default_cutoff_days")]
    pub cutoff_days: u32,
    /// Offset all dates are interpreted and written in, e.g. "+09:00"
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
    /// Worker threads; all cores when unset
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default = "default_sweep")]
    pub sweep: bool,
    #[serde(default = "default_exiftool")]
    pub exiftool: PathBuf,
    /// Also rewrite `creation_time` of videos with ffmpeg
    #[serde(default)]
    pub rewrite_video: bool,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
}

impl ProcessOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            quarantine: None,
            cutoff_days: default_cutoff_days(),
            utc_offset: default_utc_offset(),
            workers: None,
            sweep: default_sweep(),
            exiftool: default_exiftool(),
            rewrite_video: false,
            ffmpeg: default_ffmpeg(),
        }
    }

    pub fn offset(&self) -> anyhow::Result<FixedOffset> {
        self.utc_offset
            .trim()
            .parse::<FixedOffset>()
            .map_err(|e| anyhow::anyhow!("invalid UTC offset {:?}: {}", self.utc_offset, e))
    }

    /// Absolute roots, with the quarantine defaulted under the output.
    pub fn roots(&self) -> anyhow::Result<Roots> {
        let input = std::path::absolute(&self.input).context("resolving input root")?;
        let output = std::path::absolute(&self.output).context("resolving output root")?;
        let quarantine = match &self.quarantine {
            Some(q) => std::path::absolute(q).context("resolving quarantine root")?,
            None => output.join(DEFAULT_QUARANTINE_DIR),
        };
        anyhow::ensure!(
            !input.starts_with(&output) && !input.starts_with(&quarantine),
            "input {} must not be inside the output or quarantine root",
            input.display()
        );
        Ok(Roots { input, output, quarantine })
    }

    /// Parsed offset and resolved roots, failing on the first bad option.
    pub fn validate(&self) -> anyhow::Result<(FixedOffset, Roots)> {
        let offset = self.offset()?;
        let roots = self.roots()?;
        anyhow::ensure!(self.workers != Some(0), "workers must be at least 1");
        Ok((offset, roots))
    }
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    DateUnknown,
    Skipped,
    Error,
}

/// Outcome histogram of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub success: u64,
    pub date_unknown: u64,
    pub skipped: u64,
    pub error: u64,
}

impl RunSummary {
    pub fn record(mut self, outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::DateUnknown => self.date_unknown += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Error => self.error += 1,
        }
        self
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            success: self.success + other.success,
            date_unknown: self.date_unknown + other.date_unknown,
            skipped: self.skipped + other.skipped,
            error: self.error + other.error,
        }
    }

    pub fn total(&self) -> u64 {
        self.success + self.date_unknown + self.skipped + self.error
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    pub summary: RunSummary,
    /// `None` when the sweep was disabled or the run was cancelled
    #[serde(default)]
    pub sweep: Option<SweepSummary>,
    /// Files found by the scan, processed or not
    pub files_found: u64,
    #[serde(default)]
    pub cancelled: bool,
}

/// Control options for process execution (cancellation).
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    pub cancel_token: Option<CancellationToken>,
}

impl ProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// Type alias for progress callback: stage, current, total, message.
/// A total of [`UNKNOWN_TOTAL`] means the stage cannot tell how much is left.
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

pub const UNKNOWN_TOTAL: u64 = 0;

/// Throttled progress reporter: emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    last_emit: Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        Self {
            inner,
            last_emit: Mutex::new(Instant::now() - Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = total != UNKNOWN_TOTAL && current >= total;
        if !is_done {
            let mut last = self.last_emit.lock().unwrap_or_else(|e| e.into_inner());
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Metadata collaborators for a run.
pub struct Tools {
    pub extractor: Box<dyn MetadataExtractor>,
    pub writers: Vec<Box<dyn MetadataWriter>>,
}

impl Tools {
    /// ExifTool for reading and rewriting when it runs; otherwise the
    /// in-process EXIF reader and no still-image rewrite.
    pub fn detect(options: &ProcessOptions) -> anyhow::Result<Self> {
        let offset = options.offset()?;
        let exiftool = ExifTool::new(&options.exiftool);
        let mut tools = match exiftool.version() {
            Ok(version) => {
                info!("Using ExifTool {}", version);
                Tools {
                    extractor: Box::new(exiftool.clone()),
                    writers: vec![Box::new(exiftool)],
                }
            }
            Err(e) => {
                warn!("ExifTool unavailable ({}); reading EXIF in-process, embedded dates will not be rewritten", e);
                Tools {
                    extractor: Box::new(NativeExif::new(offset)),
                    writers: Vec::new(),
                }
            }
        };
        if options.rewrite_video {
            tools.writers.push(Box::new(Ffmpeg::new(&options.ffmpeg)));
        }
        Ok(tools)
    }
}

/// Match, resolve and place a single file.
pub struct Pipeline<'a> {
    resolver: DateResolver,
    extractor: &'a dyn MetadataExtractor,
    placer: Placer<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(resolver: DateResolver, extractor: &'a dyn MetadataExtractor, placer: Placer<'a>) -> Self {
        Self { resolver, extractor, placer }
    }

    pub fn process_file<S: ListingSource>(&self, cache: &mut ListingCache<S>, path: &Path) -> Outcome {
        let Some(media) = MediaFile::new(path) else {
            error!("Not a file path: {}", path.display());
            return Outcome::Error;
        };
        if !media.is_supported() {
            return self.placer.place(&media, None);
        }

        let candidates = sidecar::find_sidecars(&media, cache);
        let resolved = self.resolver.resolve(&candidates, &media.path, self.extractor);
        self.placer.place(&media, resolved.as_ref())
    }
}

/// Fan `files` out over a fixed pool of workers and sum their outcomes.
/// Returns once every file has been handled, or once the cancellation
/// token fires.
pub fn run_all(
    files: &[PathBuf],
    pipeline: &Pipeline,
    workers: Option<usize>,
    control: &ProcessControl,
    progress: &ThrottledProgress,
) -> anyhow::Result<RunSummary> {
    run_all_with(files, pipeline, workers, control, progress, || FsListing)
}

/// [`run_all`] with listings taken from `make_source`. Every worker thread
/// owns one cache for the whole run, so a directory is listed at most once
/// per worker.
pub fn run_all_with<S, F>(
    files: &[PathBuf],
    pipeline: &Pipeline,
    workers: Option<usize>,
    control: &ProcessControl,
    progress: &ThrottledProgress,
    make_source: F,
) -> anyhow::Result<RunSummary>
where
    S: ListingSource + Send,
    F: Fn() -> S,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.unwrap_or(0))
        .thread_name(|i| format!("yearsort-worker-{}", i))
        .build()
        .context("building worker pool")?;
    info!("Processing {} files on {} workers", files.len(), pool.current_num_threads());

    // Slot i is only ever locked by worker thread i
    let caches: Vec<Mutex<ListingCache<S>>> = (0..pool.current_num_threads())
        .map(|_| Mutex::new(ListingCache::with_source(make_source())))
        .collect();
    let total = files.len() as u64;
    let counter = AtomicU64::new(0);

    let summary = pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                if control.is_cancelled() {
                    return None;
                }
                let slot = rayon::current_thread_index().unwrap_or(0) % caches.len();
                let mut cache = caches[slot].lock().unwrap_or_else(|e| e.into_inner());
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.process_file(&mut *cache, path)))
                    .unwrap_or_else(|_| {
                        error!("Worker panicked on {}", path.display());
                        Outcome::Error
                    });
                drop(cache);
                let current = counter.fetch_add(1, Ordering::Relaxed) + 1;
                progress.report("process", current, total, "Sorting files");
                Some(outcome)
            })
            .fold(RunSummary::default, |acc, outcome| match outcome {
                Some(outcome) => acc.record(outcome),
                None => acc,
            })
            .reduce(RunSummary::default, RunSummary::merge)
    });
    Ok(summary)
}

/// Run the full pipeline with progress reporting.
pub fn process(
    options: &ProcessOptions,
    tools: &Tools,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<ProcessResult> {
    process_with_control(options, tools, &ProcessControl::default(), progress_callback)
}

/// Run the full pipeline with progress reporting and cancellation.
pub fn process_with_control(
    options: &ProcessOptions,
    tools: &Tools,
    control: &ProcessControl,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<ProcessResult> {
    let tp = ThrottledProgress::new(progress_callback);
    let (offset, roots) = options.validate()?;

    // Stage 1: Scan
    let files = scan::collect_files(&roots.input, &[&roots.output, &roots.quarantine], &tp)?;
    info!("Found {} candidate files under {}", files.len(), roots.input.display());

    // Stage 2: Match, resolve, place
    let placer = Placer::new(&roots, &tools.writers);
    let pipeline = Pipeline::new(DateResolver::new(offset), tools.extractor.as_ref(), placer);
    let summary = run_all(&files, &pipeline, options.workers, control, &tp)?;
    let cancelled = control.is_cancelled();
    info!(
        "Processed {} files: {} sorted, {} date unknown, {} skipped, {} errors",
        summary.total(),
        summary.success,
        summary.date_unknown,
        summary.skipped,
        summary.error
    );

    // Stage 3: Age out quarantine
    let sweep = if options.sweep && !cancelled {
        tp.report("sweep", 0, UNKNOWN_TOTAL, "Sweeping quarantine");
        let s = Sweep::new(
            &roots.quarantine,
            &roots.output,
            tools.extractor.as_ref(),
            offset,
            options.cutoff_days,
        )
        .run();
        info!("Sweep promoted {}, retained {}, failed {}", s.promoted, s.retained, s.failed);
        Some(s)
    } else {
        None
    };

    Ok(ProcessResult {
        summary,
        sweep,
        files_found: files.len() as u64,
        cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::NoMetadata;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_summary_fold() {
        let s = [Outcome::Success, Outcome::Success, Outcome::Error, Outcome::Skipped]
            .into_iter()
            .fold(RunSummary::default(), RunSummary::record);
        let t = RunSummary::default().record(Outcome::DateUnknown);
        let merged = s.merge(t);
        assert_eq!(
            merged,
            RunSummary { success: 2, date_unknown: 1, skipped: 1, error: 1 }
        );
        assert_eq!(merged.total(), 5);
    }

    #[test]
    fn test_options_defaults_from_json() {
        let opts: ProcessOptions =
            serde_json::from_str(r#"{"input":"/takeout","output":"/photos"}"#).unwrap();
        assert_eq!(opts.cutoff_days, 30);
        assert_eq!(opts.utc_offset, "+09:00");
        assert!(opts.sweep);
        assert!(!opts.rewrite_video);
        assert_eq!(opts.offset().unwrap().local_minus_utc(), 9 * 3600);

        let roots = opts.roots().unwrap();
        assert_eq!(roots.quarantine, Path::new("/photos/date_unknown"));
    }

    #[test]
    fn test_options_validation() {
        let mut opts = ProcessOptions::new("/photos/in", "/photos");
        assert!(opts.roots().is_err());
        opts.input = PathBuf::from("/takeout");
        opts.utc_offset = "nine".to_string();
        assert!(opts.offset().is_err());
        opts.utc_offset = "-05:30".to_string();
        assert_eq!(opts.offset().unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        opts.workers = Some(0);
        assert!(opts.validate().is_err());
        opts.workers = Some(4);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Outcome::DateUnknown).unwrap(), "\"date_unknown\"");
    }

    #[test]
    fn test_throttled_progress_always_emits_completion() {
        let calls = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&calls);
        let cb = move |_: &str, _: u64, _: u64, _: &str| {
            seen.fetch_add(1, Ordering::SeqCst);
        };
        let tp = ThrottledProgress::new(&cb);
        tp.report("x", 1, 10, "");
        tp.report("x", 2, 10, "");
        tp.report("x", 10, 10, "");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    /// Empty listings that count how often any directory is listed.
    struct CountingListing(Arc<AtomicUsize>);

    impl ListingSource for CountingListing {
        fn sidecar_names(&self, _dir: &Path) -> std::io::Result<Vec<String>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_each_worker_lists_a_directory_once() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        fs::create_dir_all(&input).unwrap();
        let files: Vec<PathBuf> = (0..500)
            .map(|i| {
                let p = input.join(format!("IMG_{:04}.png", i));
                fs::write(&p, b"x").unwrap();
                p
            })
            .collect();

        let roots = Roots {
            input,
            output: dir.path().join("out"),
            quarantine: dir.path().join("out/date_unknown"),
        };
        let writers: Vec<Box<dyn MetadataWriter>> = Vec::new();
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let pipeline = Pipeline::new(DateResolver::new(offset), &NoMetadata, Placer::new(&roots, &writers));
        let noop = |_: &str, _: u64, _: u64, _: &str| {};
        let progress = ThrottledProgress::new(&noop);

        let listings = Arc::new(AtomicUsize::new(0));
        let summary = run_all_with(&files, &pipeline, Some(2), &ProcessControl::new(), &progress, || {
            CountingListing(Arc::clone(&listings))
        })
        .unwrap();

        assert_eq!(summary.date_unknown, 500);
        assert!(listings.load(Ordering::SeqCst) <= 2, "listed {} times", listings.load(Ordering::SeqCst));
    }
}
