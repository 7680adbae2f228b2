// src/driver.rs

use crate::align::{Aligner, AlignmentResult};
use crate::cli::CliArgs;
use crate::config::ToolConfig;
use crate::error::{AutoVmafError, Result};
use crate::ffmpeg::{MetricRunner, Prober};
use crate::model::QualityModel;
use crate::plot;
use crate::probe::{FrameRate, StreamSummary, summarize};
use crate::reconcile::Reconciler;
use crate::report;
use crate::session::{ComparisonSession, MetricOptions, MetricReport};
use clap::ValueEnum;
use log::{error, info, warn};
use std::path::{Path, PathBuf};

/// What a batch does after one distorted file fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BatchPolicy {
    /// Report the failure and go on with the next file.
    #[default]
    Continue,
    /// Stop at the first failure.
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverOptions {
    /// Alignment search length in seconds; 0 disables the search.
    pub sync_window: f64,
    pub sync_start: f64,
    /// Offset used when no search is requested.
    pub fallback_offset: f64,
    pub reverse: bool,
    pub forced_rate: Option<FrameRate>,
    pub sync_only: bool,
    pub plot: bool,
    pub batch_policy: BatchPolicy,
    pub metric: MetricOptions,
}

impl Default for DriverOptions {
    fn default() -> Self {
        DriverOptions {
            sync_window: 0.0,
            sync_start: 0.0,
            fallback_offset: 0.0,
            reverse: false,
            forced_rate: None,
            sync_only: false,
            plot: false,
            batch_policy: BatchPolicy::Continue,
            metric: MetricOptions::default(),
        }
    }
}

impl DriverOptions {
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let model: QualityModel = args.model.parse()?;
        let forced_rate = args.fps.map(FrameRate::from_f64).transpose()?;
        Ok(DriverOptions {
            sync_window: args.sync_window,
            sync_start: args.sync_start,
            fallback_offset: args.offset,
            reverse: args.reverse,
            forced_rate,
            sync_only: args.sync_only,
            plot: args.plot,
            batch_policy: args.batch_policy,
            metric: MetricOptions {
                model,
                phone: args.phone,
                subsample: args.subsample,
                report_format: args.output_fmt,
                report_path: args.output.clone(),
                end_sync: args.endsync,
            },
        })
    }
}

/// Result of one distorted file against the reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonOutcome {
    pub main: PathBuf,
    pub offset: f64,
    pub alignment: Option<AlignmentResult>,
    /// `None` in sync-only mode.
    pub report: Option<MetricReport>,
    /// Mean score per report field.
    pub scores: Vec<(&'static str, f64)>,
    pub plot: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub completed: Vec<ComparisonOutcome>,
    pub failed: Vec<(PathBuf, AutoVmafError)>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Expands a distorted-file pattern. A literal path to an existing file is
/// accepted as is, even when it contains glob metacharacters.
pub fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let literal = Path::new(pattern);
    if literal.is_file() {
        return Ok(vec![literal.to_path_buf()]);
    }

    let entries = glob::glob(pattern)
        .map_err(|e| AutoVmafError::Input(format!("Invalid pattern '{}': {}", pattern, e)))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping unreadable match: {}", e);
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(AutoVmafError::Input(format!("No distorted files match '{}'", pattern)));
    }
    Ok(files)
}

/// Runs probe, reconcile, align, offset and the VMAF pass for every file
/// matched by a pattern, one at a time.
pub struct Driver<'a, P: Prober + ?Sized, R: MetricRunner + ?Sized> {
    prober: &'a P,
    runner: &'a R,
    config: ToolConfig,
    options: DriverOptions,
}

impl<'a, P: Prober + ?Sized, R: MetricRunner + ?Sized> Driver<'a, P, R> {
    pub fn new(prober: &'a P, runner: &'a R, config: ToolConfig, options: DriverOptions) -> Self {
        Driver {
            prober,
            runner,
            config,
            options,
        }
    }

    /// Errors cover the whole batch (missing reference, no matches). Per-file
    /// failures end up in [`BatchOutcome::failed`].
    pub fn run(&self, pattern: &str, reference: &Path) -> Result<BatchOutcome> {
        if !reference.is_file() {
            return Err(AutoVmafError::Input(format!(
                "Reference file not found: {}",
                reference.display()
            )));
        }
        let files = expand_pattern(pattern)?;
        if files.len() > 1 && self.options.metric.report_path.is_some() {
            return Err(AutoVmafError::Input(format!(
                "An explicit report path needs a single distorted file, '{}' matches {}",
                pattern,
                files.len()
            )));
        }
        info!("Found {} distorted file(s) for '{}'", files.len(), pattern);

        let reference = summarize(self.prober, reference)?;
        info!("Reference: {}", reference);

        let mut outcome = BatchOutcome::default();
        for file in files {
            match self.compare(&file, &reference) {
                Ok(result) => outcome.completed.push(result),
                Err(e) => {
                    error!("Comparison failed for {}: {}", file.display(), e);
                    outcome.failed.push((file, e));
                    if self.options.batch_policy == BatchPolicy::Abort {
                        warn!("Aborting the remaining files");
                        break;
                    }
                }
            }
        }
        Ok(outcome)
    }

    pub fn compare(&self, main: &Path, reference: &StreamSummary) -> Result<ComparisonOutcome> {
        let main_summary = summarize(self.prober, main)?;
        info!("Distorted: {}", main_summary);

        let mut session = ComparisonSession::new(
            main_summary,
            reference.clone(),
            self.config.clone(),
            self.options.metric.clone(),
        );
        let reconciler = Reconciler::new(self.options.forced_rate);

        let alignment = if self.options.sync_window > 0.0 {
            Some(Aligner::new(&reconciler).find_offset(
                &mut session,
                self.runner,
                self.options.sync_window,
                self.options.sync_start,
                self.options.reverse,
            )?)
        } else {
            None
        };
        let offset = alignment.map_or(self.options.fallback_offset, |a| a.offset);

        if self.options.sync_only {
            return Ok(ComparisonOutcome {
                main: main.to_path_buf(),
                offset,
                alignment,
                report: None,
                scores: Vec::new(),
                plot: None,
            });
        }

        session.clear_filters();
        reconciler.reconcile_session(&mut session)?;
        session.apply_offset(offset)?;
        info!(
            "Computing VMAF with model {} (offset {}s)",
            session.options().model,
            session.offset()
        );
        let metric_report = session.compute_vmaf(self.runner)?;

        let scores = report::mean_scores(&metric_report)?;
        let plot = if self.options.plot {
            Some(self.render_plot(&metric_report)?)
        } else {
            None
        };

        Ok(ComparisonOutcome {
            main: main.to_path_buf(),
            offset,
            alignment,
            report: Some(metric_report),
            scores,
            plot,
        })
    }

    fn render_plot(&self, metric_report: &MetricReport) -> Result<PathBuf> {
        let analysis = report::load(&metric_report.path, metric_report.format)?;
        let field = metric_report.fields.first().copied().unwrap_or("vmaf");
        let path = plot::plot_path(&metric_report.path);
        plot::generate_plot(&analysis.scores(field), field, &path)?;
        Ok(path)
    }
}
