use std::fs::{self, File};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use yearsort_core::{CancellationToken, ProcessControl, ProcessOptions, Tools, UNKNOWN_TOTAL};

const PROGRESS_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {msg}";

#[derive(Parser)]
#[command(
    name = "yearsort",
    version,
    about = "Sort an extracted Google Photos Takeout into per-year folders"
)]
struct Cli {
    /// Root of the extracted Takeout
    input: Option<PathBuf>,

    /// Output directory (per-year folders are created here)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Where undated files go (default: <output>/date_unknown)
    #[arg(long)]
    quarantine: Option<PathBuf>,

    /// Promote quarantined files older than this many days
    #[arg(long)]
    cutoff_days: Option<u32>,

    /// UTC offset dates are interpreted and written in, e.g. +09:00
    #[arg(long, allow_hyphen_values = true)]
    utc_offset: Option<String>,

    /// Worker threads (default: all cores)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Path to the exiftool executable
    #[arg(long)]
    exiftool: Option<PathBuf>,

    /// Path to the ffmpeg executable
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Also rewrite creation_time of mp4/mov/m4v files with ffmpeg
    #[arg(long)]
    rewrite_video: bool,

    /// Skip the quarantine aging sweep
    #[arg(long)]
    no_sweep: bool,

    /// JSON options file; flags given on the command line override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v=INFO, -vv=DEBUG, -vvv=TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Write the diagnostic log to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print the run result as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn setup_logging(verbosity: u8, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).parse_default_env();
    if let Some(path) = log_file {
        let file = File::create(path).with_context(|| format!("creating log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn build_options(cli: &Cli) -> anyhow::Result<ProcessOptions> {
    let mut options = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => {
            let input = cli.input.clone().context("INPUT is required without --config")?;
            let output = cli.output.clone().context("--output is required without --config")?;
            ProcessOptions::new(input, output)
        }
    };

    if let Some(input) = &cli.input {
        options.input = input.clone();
    }
    if let Some(output) = &cli.output {
        options.output = output.clone();
    }
    if let Some(quarantine) = &cli.quarantine {
        options.quarantine = Some(quarantine.clone());
    }
    if let Some(days) = cli.cutoff_days {
        options.cutoff_days = days;
    }
    if let Some(offset) = &cli.utc_offset {
        options.utc_offset = offset.clone();
    }
    if cli.workers.is_some() {
        options.workers = cli.workers;
    }
    if let Some(exiftool) = &cli.exiftool {
        options.exiftool = exiftool.clone();
    }
    if let Some(ffmpeg) = &cli.ffmpeg {
        options.ffmpeg = ffmpeg.clone();
    }
    if cli.rewrite_video {
        options.rewrite_video = true;
    }
    if cli.no_sweep {
        options.sweep = false;
    }
    Ok(options)
}

fn progress_bar() -> anyhow::Result<(ProgressBar, ProgressStyle, ProgressStyle)> {
    let bar_style = ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)?
        .progress_chars("=>-");
    let spinner_style = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE)?;
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style.clone());
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok((pb, bar_style, spinner_style))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.log_file.as_ref())?;
    let t_total = std::time::Instant::now();

    let options = build_options(&cli)?;
    options.validate()?;
    let tools = Tools::detect(&options)?;

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, finishing files in flight...");
        handler_token.cancel();
    })
    .context("installing Ctrl-C handler")?;
    let control = ProcessControl::new().with_cancel_token(token);

    let (pb, bar_style, spinner_style) = progress_bar()?;
    let pb_cb = pb.clone();
    let result = yearsort_core::process_with_control(&options, &tools, &control, &move |stage, current, total, message| {
        if total == UNKNOWN_TOTAL {
            pb_cb.set_style(spinner_style.clone());
            pb_cb.set_message(format!("[{}] {} ({})", stage, message, current));
        } else {
            pb_cb.set_style(bar_style.clone());
            pb_cb.set_length(total);
            pb_cb.set_position(current);
            pb_cb.set_message(format!("[{}] {}", stage, message));
        }
    });
    pb.finish_and_clear();
    let result = result?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    let s = &result.summary;
    eprintln!(
        "{} {} files: {} sorted, {} date unknown, {} skipped, {} errors ({:.2}s)",
        if result.cancelled { "Cancelled after" } else { "Done!" },
        s.total(),
        s.success,
        s.date_unknown,
        s.skipped,
        s.error,
        t_total.elapsed().as_secs_f64()
    );
    if let Some(sweep) = &result.sweep {
        eprintln!(
            "Quarantine sweep: {} promoted, {} retained, {} failed",
            sweep.promoted, sweep.retained, sweep.failed
        );
    }
    info!("Finished in {:.2}s", t_total.elapsed().as_secs_f64());

    if result.cancelled || s.error > 0 {
        std::process::exit(1);
    }
    Ok(())
}
