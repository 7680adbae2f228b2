// src/session.rs

use crate::config::ToolConfig;
use crate::error::{AutoVmafError, Result};
use crate::ffmpeg::MetricRunner;
use crate::filters::FilterChain;
use crate::model::{PHONE_FIELD, QualityModel, ReportFormat};
use crate::probe::StreamSummary;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// A physical input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Main,
    Reference,
}

/// The part an input currently plays in the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Main,
    Reference,
}

/// Options of the final VMAF pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricOptions {
    pub model: QualityModel,
    pub phone: bool,
    pub subsample: u32,
    pub report_format: ReportFormat,
    pub report_path: Option<PathBuf>,
    pub end_sync: bool,
}

impl Default for MetricOptions {
    fn default() -> Self {
        MetricOptions {
            model: QualityModel::Hd,
            phone: false,
            subsample: 1,
            report_format: ReportFormat::Json,
            report_path: None,
            end_sync: false,
        }
    }
}

/// Trims produced by [`ComparisonSession::apply_offset`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimWindow {
    pub main_start: f64,
    pub reference_start: f64,
    pub duration: f64,
}

/// Handle to the report written by a completed VMAF pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricReport {
    pub path: PathBuf,
    pub format: ReportFormat,
    /// Score fields present in the report; the first one is the model's own.
    pub fields: Vec<&'static str>,
}

#[derive(Debug, Clone)]
struct Input {
    summary: StreamSummary,
    chain: FilterChain,
}

/// Two filter chains (main is ffmpeg input 0, reference input 1) plus the
/// state needed to build and run a metric command over them.
///
/// Role inversion never touches the chains: it only changes which physical
/// stream answers to [`Role::Main`] and [`Role::Reference`].
#[derive(Debug, Clone)]
pub struct ComparisonSession {
    main: Input,
    reference: Input,
    inverted: bool,
    offset: f64,
    config: ToolConfig,
    options: MetricOptions,
}

static PSNR_AVERAGE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"PSNR .*average:\s*(?P<avg>inf|[0-9]+(?:\.[0-9]*)?)").expect("Invalid PSNR Regex")
});

impl ComparisonSession {
    pub fn new(
        main: StreamSummary,
        reference: StreamSummary,
        config: ToolConfig,
        mut options: MetricOptions,
    ) -> Self {
        if options.phone && !options.model.supports_phone() {
            warn!("Phone model is only available for HD models, ignoring it for {}", options.model);
            options.phone = false;
        }
        ComparisonSession {
            main: Input {
                summary: main,
                chain: FilterChain::new(0),
            },
            reference: Input {
                summary: reference,
                chain: FilterChain::new(1),
            },
            inverted: false,
            offset: 0.0,
            config,
            options,
        }
    }

    pub fn options(&self) -> &MetricOptions {
        &self.options
    }

    pub fn target_resolution(&self) -> (u32, u32) {
        self.options.model.target_resolution()
    }

    /// Swaps which physical stream plays the main role. Called in pairs.
    pub fn invert_roles(&mut self) {
        self.inverted = !self.inverted;
        debug!("Roles inverted: {}", self.inverted);
    }

    pub fn role_of(&self, stream: Stream) -> Role {
        match (stream, self.inverted) {
            (Stream::Main, false) | (Stream::Reference, true) => Role::Main,
            (Stream::Reference, false) | (Stream::Main, true) => Role::Reference,
        }
    }

    pub fn stream_for(&self, role: Role) -> Stream {
        match (role, self.inverted) {
            (Role::Main, false) | (Role::Reference, true) => Stream::Main,
            (Role::Reference, false) | (Role::Main, true) => Stream::Reference,
        }
    }

    pub fn summary(&self, stream: Stream) -> &StreamSummary {
        &self.input(stream).summary
    }

    pub fn path_for_role(&self, role: Role) -> &Path {
        &self.summary(self.stream_for(role)).path
    }

    pub fn chain(&self, stream: Stream) -> &FilterChain {
        &self.input(stream).chain
    }

    pub fn chain_mut(&mut self, stream: Stream) -> &mut FilterChain {
        &mut self.input_mut(stream).chain
    }

    pub fn chain_for_role(&mut self, role: Role) -> &mut FilterChain {
        let stream = self.stream_for(role);
        self.chain_mut(stream)
    }

    pub fn clear_filters(&mut self) {
        self.main.chain.clear();
        self.reference.chain.clear();
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Translates a signed offset into trims.
    ///
    /// Positive: the reference is delayed, so it is cut starting at `offset`.
    /// Negative: the main input is cut instead. Zero adds nothing.
    pub fn apply_offset(&mut self, offset: f64) -> Result<Option<TrimWindow>> {
        if !offset.is_finite() {
            return Err(AutoVmafError::invalid_parameter(
                "trim",
                format!("offset {} is not a finite number", offset),
            ));
        }
        self.offset = offset;

        let main_duration = self.summary(self.stream_for(Role::Main)).duration;
        let reference_duration = self.summary(self.stream_for(Role::Reference)).duration;

        let window = if offset > 0.0 {
            TrimWindow {
                main_start: 0.0,
                reference_start: offset,
                duration: main_duration.min(reference_duration - offset),
            }
        } else if offset < 0.0 {
            let offset = offset.abs();
            TrimWindow {
                main_start: offset,
                reference_start: 0.0,
                duration: (main_duration - offset).min(reference_duration),
            }
        } else {
            return Ok(None);
        };

        info!(
            "Applying offset {}s: main from {}s, reference from {}s, {}s long",
            offset, window.main_start, window.reference_start, window.duration
        );
        self.chain_for_role(Role::Reference)
            .trim(window.reference_start, window.duration)?;
        self.chain_for_role(Role::Main)
            .trim(window.main_start, window.duration)?;
        Ok(Some(window))
    }

    /// Joins both chains and the metric filter into one `-lavfi` graph.
    pub fn filter_graph(&self, metric_filter: &str) -> String {
        let main_label = self.chain(self.stream_for(Role::Main)).last_output();
        let reference_label = self.chain(self.stream_for(Role::Reference)).last_output();

        let mut segments = self.main.chain.render();
        segments.extend(self.reference.chain.render());
        segments.push(format!("[{}][{}]{}", main_label, reference_label, metric_filter));
        segments.join(";")
    }

    fn command_args(&self, filter_graph: String) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            if self.config.show_progress { "-stats" } else { "-nostats" }.to_string(),
            "-loglevel".to_string(), self.config.tool_log_level.to_string(),
            "-i".to_string(), self.main.summary.path.to_string_lossy().to_string(),
            "-i".to_string(), self.reference.summary.path.to_string_lossy().to_string(),
            "-lavfi".to_string(), filter_graph,
            "-f".to_string(), "null".to_string(),
            "-".to_string(),
        ]
    }

    /// Runs a PSNR pass over the current chains and returns the average.
    pub fn compute_psnr<R: MetricRunner + ?Sized>(&self, runner: &R) -> Result<f64> {
        let args = self.command_args(self.filter_graph("psnr"));
        let stderr = runner.run_captured(&args, "PSNR")?;
        parse_psnr_average(&stderr)
    }

    /// Where the VMAF report goes: the override, or next to the main file as
    /// `<stem>_<field>.<ext>`.
    pub fn report_path(&self) -> PathBuf {
        if let Some(path) = &self.options.report_path {
            return path.clone();
        }
        let main = &self.main.summary.path;
        let stem = main
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "autovmaf".to_string());
        main.with_file_name(format!(
            "{}_{}.{}",
            stem,
            self.options.model.report_field(),
            self.options.report_format.extension()
        ))
    }

    fn vmaf_filter(&self, report_path: &Path) -> String {
        let model = self.options.model;
        let model_path = model.model_path(&self.config);
        let mut models = format!("path={}\\:name={}", model_path.display(), model.report_field());
        if self.options.phone {
            models.push_str(&format!(
                "|path={}\\:name={}\\:enable_transform=true",
                model_path.display(),
                PHONE_FIELD
            ));
        }
        let mut filter = format!(
            "libvmaf=log_fmt={}:log_path='{}':model={}:n_subsample={}:n_threads={}",
            self.options.report_format.extension(),
            report_path.display(),
            models,
            self.options.subsample,
            self.config.threads
        );
        if self.options.end_sync {
            filter.push_str(":shortest=1");
        }
        filter
    }

    /// Runs the full-length VMAF pass and waits for it to finish.
    pub fn compute_vmaf<R: MetricRunner + ?Sized>(&self, runner: &R) -> Result<MetricReport> {
        let report_path = self.report_path();
        let args = self.command_args(self.filter_graph(&self.vmaf_filter(&report_path)));
        runner.run_to_completion(&args, "VMAF Calculation")?;

        if !report_path.exists() {
            return Err(AutoVmafError::Command(format!(
                "VMAF report was not created: {}",
                report_path.display()
            )));
        }

        let mut fields = vec![self.options.model.report_field()];
        if self.options.phone {
            fields.push(PHONE_FIELD);
        }
        info!("VMAF analysis complete. Output: {}", report_path.display());
        Ok(MetricReport {
            path: report_path,
            format: self.options.report_format,
            fields,
        })
    }

    fn input(&self, stream: Stream) -> &Input {
        match stream {
            Stream::Main => &self.main,
            Stream::Reference => &self.reference,
        }
    }

    fn input_mut(&mut self, stream: Stream) -> &mut Input {
        match stream {
            Stream::Main => &mut self.main,
            Stream::Reference => &mut self.reference,
        }
    }
}

/// Extracts the last `average:` value printed by the psnr filter.
pub fn parse_psnr_average(stderr: &str) -> Result<f64> {
    let average = PSNR_AVERAGE_REGEX
        .captures_iter(stderr)
        .last()
        .and_then(|caps| caps.name("avg"))
        .ok_or_else(|| AutoVmafError::Parse("No PSNR average found in ffmpeg output".to_string()))?
        .as_str();
    if average == "inf" {
        return Ok(f64::INFINITY);
    }
    average
        .parse::<f64>()
        .map_err(|_| AutoVmafError::Parse(format!("Invalid PSNR value: {}", average)))
}
