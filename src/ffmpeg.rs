// src/ffmpeg.rs

use crate::config::ToolConfig;
use crate::error::{AutoVmafError, Result};
use log::{debug, error, info};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Instant;

/// One ffprobe query. Each section is a separate process invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeSection {
    Streams,
    Format,
    Frames,
    Packets,
}

impl ProbeSection {
    fn flag(self) -> &'static str {
        match self {
            ProbeSection::Streams => "-show_streams",
            ProbeSection::Format => "-show_format",
            ProbeSection::Frames => "-show_frames",
            ProbeSection::Packets => "-show_packets",
        }
    }

    /// Top-level key of the JSON document holding this section.
    pub fn key(self) -> &'static str {
        match self {
            ProbeSection::Streams => "streams",
            ProbeSection::Format => "format",
            ProbeSection::Frames => "frames",
            ProbeSection::Packets => "packets",
        }
    }
}

/// Runs a probe request and returns the parsed JSON document.
pub trait Prober {
    fn probe(&self, path: &Path, section: ProbeSection) -> Result<serde_json::Value>;
}

/// Runs the metric tool with a prepared argument list.
pub trait MetricRunner {
    /// Runs to completion and returns the captured stderr, where ffmpeg prints
    /// filter summaries such as the PSNR average.
    fn run_captured(&self, args: &[String], description: &str) -> Result<String>;

    /// Runs to completion. Results are written by the filters themselves
    /// (e.g. the libvmaf log file).
    fn run_to_completion(&self, args: &[String], description: &str) -> Result<()>;
}

/// Process-backed implementation of [`Prober`] and [`MetricRunner`].
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    config: ToolConfig,
}

impl FfmpegTools {
    pub fn new(config: ToolConfig) -> Self {
        FfmpegTools { config }
    }

    fn ffprobe_args(&self, path: &Path, section: ProbeSection) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(), self.config.tool_log_level.to_string(),
            "-print_format".to_string(), "json".to_string(),
            section.flag().to_string(),
            "-select_streams".to_string(), "v".to_string(),
            "-i".to_string(), path.to_string_lossy().to_string(),
            // Frame and packet analysis only needs the first seconds.
            "-read_intervals".to_string(), "%+5".to_string(),
        ]
    }

    fn ffmpeg_command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.config.ffmpeg);
        command.args(args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
        command
    }
}

impl Prober for FfmpegTools {
    fn probe(&self, path: &Path, section: ProbeSection) -> Result<serde_json::Value> {
        debug!("Probing {} ({})", path.display(), section.key());

        let output = Command::new(&self.config.ffprobe)
            .args(self.ffprobe_args(path, section))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| AutoVmafError::probe(path, format!("failed to start ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("ffprobe failed for {}: {}", path.display(), stderr);
            return Err(AutoVmafError::probe(
                path,
                format!("ffprobe exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            AutoVmafError::probe(path, format!("failed to parse ffprobe JSON: {}", e))
        })
    }
}

impl MetricRunner for FfmpegTools {
    fn run_captured(&self, args: &[String], description: &str) -> Result<String> {
        info!("Running FFmpeg for {}", description);
        debug!("ffmpeg {}", args.join(" "));

        let start_time = Instant::now();
        let output = self
            .ffmpeg_command(args)
            .stderr(Stdio::piped())
            .output()
            .map_err(AutoVmafError::Io)?;
        let duration = start_time.elapsed();

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            error!("FFmpeg command failed for {} ({}ms): {}", description, duration.as_millis(), stderr);
            return Err(AutoVmafError::Command(format!(
                "FFmpeg {} failed: {}",
                description,
                stderr.trim()
            )));
        }
        debug!("FFmpeg command successful for {} ({}ms)", description, duration.as_millis());
        Ok(stderr)
    }

    fn run_to_completion(&self, args: &[String], description: &str) -> Result<()> {
        info!("Running FFmpeg for {}", description);
        debug!("ffmpeg {}", args.join(" "));

        let mut command = self.ffmpeg_command(args);
        if self.config.show_progress {
            // Let the progress statistics reach the terminal.
            command.stderr(Stdio::inherit());
        } else {
            command.stderr(Stdio::piped());
        }

        let start_time = Instant::now();
        let output = command.output().map_err(AutoVmafError::Io)?;
        let duration = start_time.elapsed();

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            error!("FFmpeg command failed for {} ({}ms): {}", description, duration.as_millis(), stderr);
            Err(AutoVmafError::Command(format!(
                "FFmpeg {} failed ({})",
                description, output.status
            )))
        } else {
            debug!("FFmpeg stderr for {} ({}ms): {}", description, duration.as_millis(), stderr);
            info!("FFmpeg command successful for {} ({}ms)", description, duration.as_millis());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn section_keys_match_ffprobe_json() {
        assert_eq!(ProbeSection::Streams.key(), "streams");
        assert_eq!(ProbeSection::Frames.flag(), "-show_frames");
        assert_eq!(ProbeSection::Packets.key(), "packets");
    }

    #[test]
    fn ffprobe_follows_configured_log_level() {
        let tools = FfmpegTools::new(ToolConfig {
            tool_log_level: "verbose",
            ..ToolConfig::default()
        });
        let args = tools.ffprobe_args(Path::new("sample.ts"), ProbeSection::Frames);
        let level = args.iter().position(|a| a == "-loglevel").unwrap() + 1;
        assert_eq!(args[level], "verbose");
        assert!(args.contains(&"-show_frames".to_string()));
        assert_eq!(args[args.len() - 2..], ["-read_intervals", "%+5"]);
    }

    #[test]
    fn missing_ffprobe_binary_is_a_probe_error() {
        let tools = FfmpegTools::new(ToolConfig {
            ffprobe: PathBuf::from("/nonexistent/ffprobe-binary"),
            ..ToolConfig::default()
        });
        let err = tools
            .probe(Path::new("sample.mp4"), ProbeSection::Streams)
            .unwrap_err();
        assert!(matches!(err, AutoVmafError::Probe { .. }));
    }

    #[test]
    fn missing_ffmpeg_binary_surfaces_io_error() {
        let tools = FfmpegTools::new(ToolConfig {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg-binary"),
            ..ToolConfig::default()
        });
        let err = tools
            .run_captured(&["-version".to_string()], "version check")
            .unwrap_err();
        assert!(matches!(err, AutoVmafError::Io(_)));
    }
}
