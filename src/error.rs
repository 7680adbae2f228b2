// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutoVmafError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg/FFprobe command failed: {0}")]
    Command(String),

    #[error("Failed to parse command output: {0}")]
    Parse(String),

    #[error("JSON processing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Probe failed for {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("Invalid parameter for {filter} filter: {reason}")]
    InvalidFilterParameter { filter: &'static str, reason: String },

    #[error(
        "No filter available for these frame rates: reference {} ({reference_resolution}, {reference_fps} fps, interlaced={reference_interlaced}), main {} ({main_resolution}, {main_fps} fps, interlaced={main_interlaced})",
        .reference_path.display(),
        .main_path.display()
    )]
    Reconciliation {
        reference_path: PathBuf,
        main_path: PathBuf,
        reference_resolution: String,
        main_resolution: String,
        reference_fps: String,
        main_fps: String,
        reference_interlaced: bool,
        main_interlaced: bool,
    },

    #[error("Alignment step at offset {offset:.5}s failed: {source}")]
    Alignment {
        offset: f64,
        #[source]
        source: Box<AutoVmafError>,
    },

    #[error("Unsupported quality model: {0} (expected HD, HDneg or 4K)")]
    UnsupportedModel(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Plotting error: {0}")]
    Plot(String),

    #[error("Input error: {0}")]
    Input(String),
}

impl AutoVmafError {
    pub(crate) fn invalid_parameter(filter: &'static str, reason: impl Into<String>) -> Self {
        AutoVmafError::InvalidFilterParameter {
            filter,
            reason: reason.into(),
        }
    }

    pub(crate) fn probe(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        AutoVmafError::Probe {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// Define a standard Result type for the crate
pub type Result<T> = std::result::Result<T, AutoVmafError>;
