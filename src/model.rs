// src/model.rs

use crate::config::{HD_MODEL_FILE, HD_NEG_MODEL_FILE, ToolConfig, UHD_MODEL_FILE};
use crate::error::{AutoVmafError, Result};
use clap::ValueEnum;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Report field written for the phone viewing variant.
pub const PHONE_FIELD: &str = "vmaf_phone";

/// A VMAF model bundle: target resolution, model file and report field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityModel {
    Hd,
    HdNeg,
    Uhd,
}

impl QualityModel {
    /// Resolution both inputs are scaled to before comparison.
    pub fn target_resolution(self) -> (u32, u32) {
        match self {
            QualityModel::Hd | QualityModel::HdNeg => (1920, 1080),
            QualityModel::Uhd => (3840, 2160),
        }
    }

    pub fn report_field(self) -> &'static str {
        match self {
            QualityModel::Hd => "vmaf",
            QualityModel::HdNeg => "vmaf_neg",
            QualityModel::Uhd => "vmaf_4k",
        }
    }

    pub fn model_path(self, config: &ToolConfig) -> PathBuf {
        config.model_path(match self {
            QualityModel::Hd => HD_MODEL_FILE,
            QualityModel::HdNeg => HD_NEG_MODEL_FILE,
            QualityModel::Uhd => UHD_MODEL_FILE,
        })
    }

    pub fn supports_phone(self) -> bool {
        !matches!(self, QualityModel::Uhd)
    }
}

impl FromStr for QualityModel {
    type Err = AutoVmafError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HD" => Ok(QualityModel::Hd),
            "HDneg" => Ok(QualityModel::HdNeg),
            "4K" => Ok(QualityModel::Uhd),
            other => Err(AutoVmafError::UnsupportedModel(other.to_string())),
        }
    }
}

impl fmt::Display for QualityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QualityModel::Hd => "HD",
            QualityModel::HdNeg => "HDneg",
            QualityModel::Uhd => "4K",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Json,
    Xml,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Xml => "xml",
        }
    }
}
