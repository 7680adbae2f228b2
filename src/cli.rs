// src/cli.rs

use crate::driver::BatchPolicy;
use crate::model::ReportFormat;
use clap::Parser;
use std::path::PathBuf;

/// Compute VMAF between a distorted sample and a reference.
///
/// Both inputs are scaled to the resolution of the selected model, deinterlaced
/// and frame-rate normalized when needed, and optionally time-aligned with a
/// frame-by-frame PSNR search before the final VMAF pass.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Distorted video file, or a glob pattern matching several files
    #[arg(short = 'd', long = "distorted", value_name = "PATTERN")]
    pub distorted: String,

    /// Reference video file
    #[arg(short = 'r', long = "reference")]
    pub reference: PathBuf,

    /// Sync window in seconds. The alignment search looks for the best offset inside this window (0 disables it)
    #[arg(long = "sw", default_value_t = 0.0, value_name = "SECONDS")]
    pub sync_window: f64,

    /// Start of the sync window in seconds, measured on the reference (on the distorted input with --reverse)
    #[arg(long = "ss", default_value_t = 0.0, value_name = "SECONDS")]
    pub sync_start: f64,

    /// Fixed offset in seconds applied when no sync window is requested
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub offset: f64,

    /// Force the output frame rate of both inputs (disables automatic deinterlacing)
    #[arg(long)]
    pub fps: Option<f64>,

    /// libvmaf frame subsampling
    #[arg(long, default_value_t = 1)]
    pub subsample: u32,

    /// Apply the sync window to the distorted input instead of the reference
    #[arg(long)]
    pub reverse: bool,

    /// VMAF model: HD, HDneg or 4K
    #[arg(long, default_value = "HD")]
    pub model: String,

    /// Also compute the phone viewing score (HD models only)
    #[arg(long)]
    pub phone: bool,

    /// libvmaf threads (0 uses every available core)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Report format
    #[arg(long = "output-fmt", value_enum, default_value_t = ReportFormat::Json)]
    pub output_fmt: ReportFormat,

    /// Report path (default: derived from the distorted filename)
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Only run the sync search, print the offset and exit
    #[arg(long)]
    pub sync_only: bool,

    /// Stop the VMAF computation when the shortest input ends
    #[arg(long)]
    pub endsync: bool,

    /// Show ffmpeg progress statistics
    #[arg(long)]
    pub progress: bool,

    /// Render a PNG plot of the per-frame scores next to the report
    #[arg(long)]
    pub plot: bool,

    /// What to do when one distorted file fails
    #[arg(long, value_enum, default_value_t = BatchPolicy::Continue)]
    pub batch_policy: BatchPolicy,

    /// Verbose logging (also raises the ffmpeg log level)
    #[arg(long)]
    pub verbose: bool,

    /// Enable logging to file (e.g., autovmaf_YYYYMMDD_HHMMSS.log)
    #[arg(long)]
    pub log: bool,

    /// Directory for the log file (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// ffmpeg binary
    #[arg(long, env = "AUTOVMAF_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// ffprobe binary
    #[arg(long, env = "AUTOVMAF_FFPROBE", default_value = "ffprobe")]
    pub ffprobe: PathBuf,

    /// Directory holding the libvmaf model files
    #[arg(long, env = "AUTOVMAF_MODEL_DIR", default_value = crate::config::DEFAULT_MODEL_DIR)]
    pub model_dir: PathBuf,
}

pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}
