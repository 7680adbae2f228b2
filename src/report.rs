// src/report.rs

use crate::error::{AutoVmafError, Result};
use crate::model::ReportFormat;
use crate::session::MetricReport;
use log::{debug, info, warn};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

// --- Data Structures ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FrameScores {
    #[serde(rename = "frameNum")]
    pub frame_num: u64,
    /// Every per-frame feature libvmaf logged, model scores included.
    pub metrics: HashMap<String, f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetricStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harmonic_mean: Option<f64>,
}

/// Parsed libvmaf log, whatever the format it was written in.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    pub frames: Vec<FrameScores>,
    #[serde(default)]
    pub pooled_metrics: HashMap<String, MetricStats>,
}

impl AnalysisReport {
    /// `(frame number, score)` for every frame carrying `field`.
    pub fn scores(&self, field: &str) -> Vec<(u64, f64)> {
        self.frames
            .iter()
            .filter_map(|frame| frame.metrics.get(field).map(|score| (frame.frame_num, *score)))
            .collect()
    }

    /// Arithmetic mean of `field` over the frames.
    pub fn mean(&self, field: &str) -> Result<f64> {
        let scores = self.scores(field);
        if scores.is_empty() {
            return Err(AutoVmafError::Report(format!("No '{}' scores found in report", field)));
        }
        if scores.len() < self.frames.len() {
            warn!(
                "Missing '{}' scores for {} out of {} frames",
                field,
                self.frames.len() - scores.len(),
                self.frames.len()
            );
        }
        Ok(scores.iter().map(|(_, score)| score).sum::<f64>() / scores.len() as f64)
    }
}

// --- Loading ---

/// Reads the report a VMAF pass produced and returns the mean of each of its
/// score fields, in the report's field order.
pub fn mean_scores(report: &MetricReport) -> Result<Vec<(&'static str, f64)>> {
    let analysis = load(&report.path, report.format)?;
    report
        .fields
        .iter()
        .map(|field| {
            let mean = analysis.mean(field)?;
            if let Some(pooled) = analysis.pooled_metrics.get(*field) {
                debug!("Pooled {} mean: {:.4} (frames: {:.4})", field, pooled.mean, mean);
            }
            Ok((*field, mean))
        })
        .collect()
}

pub fn load(path: &Path, format: ReportFormat) -> Result<AnalysisReport> {
    let content = fs::read_to_string(path).map_err(|e| {
        AutoVmafError::Report(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let report = match format {
        ReportFormat::Json => parse_json(&content)?,
        ReportFormat::Xml => parse_xml(&content)?,
    };
    validate(&report)?;
    info!("Read {} frames from {}", report.frames.len(), path.display());
    Ok(report)
}

pub fn parse_json(content: &str) -> Result<AnalysisReport> {
    Ok(serde_json::from_str(content)?)
}

/// Reads `<frame frameNum=".." field="..">` and
/// `<metric name=".." min=".." .../>` elements. Other elements are ignored.
pub fn parse_xml(content: &str) -> Result<AnalysisReport> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut report = AnalysisReport::default();
    let mut in_pooled = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"frame" => report.frames.push(frame_from_xml(&e)?),
                b"pooled_metrics" => in_pooled = true,
                b"metric" if in_pooled => {
                    let (name, stats) = stats_from_xml(&e)?;
                    report.pooled_metrics.insert(name, stats);
                }
                _ => {}
            },
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"pooled_metrics" {
                    in_pooled = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AutoVmafError::Report(format!(
                    "XML parse error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }
    Ok(report)
}

fn attributes(element: &BytesStart) -> Result<Vec<(String, String)>> {
    element
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(|e| AutoVmafError::Report(format!("Invalid XML attribute: {}", e)))?;
            Ok((
                String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned(),
                String::from_utf8_lossy(&attr.value).into_owned(),
            ))
        })
        .collect()
}

fn xml_number(key: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| AutoVmafError::Report(format!("Invalid value for '{}': {}", key, value)))
}

fn frame_from_xml(element: &BytesStart) -> Result<FrameScores> {
    let mut frame_num = None;
    let mut metrics = HashMap::new();
    for (key, value) in attributes(element)? {
        if key == "frameNum" {
            frame_num = Some(value.parse::<u64>().map_err(|_| {
                AutoVmafError::Report(format!("Invalid frameNum: {}", value))
            })?);
        } else {
            let score = xml_number(&key, &value)?;
            metrics.insert(key, score);
        }
    }
    let frame_num =
        frame_num.ok_or_else(|| AutoVmafError::Report("Frame without frameNum".to_string()))?;
    Ok(FrameScores { frame_num, metrics })
}

fn stats_from_xml(element: &BytesStart) -> Result<(String, MetricStats)> {
    let mut name = None;
    let mut values = HashMap::new();
    for (key, value) in attributes(element)? {
        if key == "name" {
            name = Some(value);
        } else {
            values.insert(key.clone(), xml_number(&key, &value)?);
        }
    }
    let name = name.ok_or_else(|| AutoVmafError::Report("Pooled metric without name".to_string()))?;
    let field = |key: &str| {
        values
            .get(key)
            .copied()
            .ok_or_else(|| AutoVmafError::Report(format!("Pooled metric '{}' lacks '{}'", name, key)))
    };
    let stats = MetricStats {
        min: field("min")?,
        max: field("max")?,
        mean: field("mean")?,
        harmonic_mean: values.get("harmonic_mean").copied(),
    };
    Ok((name, stats))
}

// --- Validation ---

pub fn validate(report: &AnalysisReport) -> Result<()> {
    if report.frames.is_empty() {
        return Err(AutoVmafError::Report("No frames found in the report".to_string()));
    }
    Ok(())
}
