// src/config.rs

use crate::cli::CliArgs;
use std::path::PathBuf;

/// Default location of the libvmaf model files.
pub const DEFAULT_MODEL_DIR: &str = "/usr/local/share/model";

pub const HD_MODEL_FILE: &str = "vmaf_float_v0.6.1.json";
pub const HD_NEG_MODEL_FILE: &str = "vmaf_float_v0.6.1neg.json";
pub const UHD_MODEL_FILE: &str = "vmaf_4k_v0.6.1.json";

/// External tool configuration, built once at startup and handed to the
/// prober, the metric runner and every comparison session.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub model_dir: PathBuf,
    /// Thread count handed to libvmaf. Always >= 1 once resolved.
    pub threads: usize,
    /// Value passed to the tools' own `-loglevel`.
    pub tool_log_level: &'static str,
    pub show_progress: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            threads: num_cpus::get(),
            tool_log_level: "info",
            show_progress: false,
        }
    }
}

impl ToolConfig {
    pub fn from_args(args: &CliArgs) -> Self {
        ToolConfig {
            ffmpeg: args.ffmpeg.clone(),
            ffprobe: args.ffprobe.clone(),
            model_dir: args.model_dir.clone(),
            threads: resolve_threads(args.threads),
            tool_log_level: if args.verbose { "verbose" } else { "info" },
            show_progress: args.progress,
        }
    }

    pub fn model_path(&self, file_name: &str) -> PathBuf {
        self.model_dir.join(file_name)
    }
}

/// `0` means every available core.
pub fn resolve_threads(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get()
    } else {
        requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threads_resolves_to_available_cores() {
        assert_eq!(resolve_threads(0), num_cpus::get());
        assert_eq!(resolve_threads(3), 3);
    }

    #[test]
    fn model_path_joins_model_dir() {
        let config = ToolConfig {
            model_dir: PathBuf::from("/opt/models"),
            ..ToolConfig::default()
        };
        assert_eq!(
            config.model_path(HD_MODEL_FILE),
            PathBuf::from("/opt/models/vmaf_float_v0.6.1.json")
        );
    }
}
