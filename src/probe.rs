// src/probe.rs

use crate::error::{AutoVmafError, Result};
use crate::ffmpeg::{ProbeSection, Prober};
use log::{debug, info};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A rational frame rate as reported by ffprobe (`r_frame_rate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Result<Self> {
        if num == 0 || den == 0 {
            return Err(AutoVmafError::invalid_parameter(
                "fps",
                format!("frame rate {}/{} must be positive", num, den),
            ));
        }
        let divisor = gcd(num, den);
        Ok(FrameRate {
            num: num / divisor,
            den: den / divisor,
        })
    }

    /// Builds a rate from a user supplied decimal value, keeping three decimals.
    pub fn from_f64(fps: f64) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(AutoVmafError::invalid_parameter(
                "fps",
                format!("frame rate {} must be a positive number", fps),
            ));
        }
        let scaled = (fps * 1000.0).round();
        if scaled < 1.0 || scaled > u32::MAX as f64 {
            return Err(AutoVmafError::invalid_parameter(
                "fps",
                format!("frame rate {} is out of range", fps),
            ));
        }
        FrameRate::new(scaled as u32, 1000)
    }

    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Nearest integer rate, used for equality and ratio tests so that drift
    /// rates such as 30000/1001 compare equal to 30.
    pub fn rounded(self) -> i64 {
        self.as_f64().round() as i64
    }

    pub fn frame_duration(self) -> f64 {
        self.den as f64 / self.num as f64
    }
}

impl FromStr for FrameRate {
    type Err = AutoVmafError;

    /// Parses frame rate string (e.g., "24000/1001" or "25").
    fn from_str(fps_str: &str) -> Result<Self> {
        let parse_part = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| AutoVmafError::Parse(format!("Invalid frame rate: {}", fps_str)))
        };
        match fps_str.split_once('/') {
            Some((num, den)) => FrameRate::new(parse_part(num)?, parse_part(den)?)
                .map_err(|_| AutoVmafError::Parse(format!("Invalid frame rate: {}", fps_str))),
            None => match fps_str.trim().parse::<f64>() {
                Ok(fps) => FrameRate::from_f64(fps)
                    .map_err(|_| AutoVmafError::Parse(format!("Invalid frame rate: {}", fps_str))),
                Err(_) => Err(AutoVmafError::Parse(format!("Invalid frame rate: {}", fps_str))),
            },
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Summary of one probed video file. Computed once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub interlaced_frames: u64,
    pub total_frames: u64,
    pub interlaced_fraction: f64,
    pub is_interlaced: bool,
    /// Seconds, rounded to a whole number.
    pub duration: f64,
    pub total_packet_bytes: u64,
}

impl StreamSummary {
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Display for StreamSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {:.5} fps | {}x{} | {} | {}s",
            self.path.display(),
            self.frame_rate.as_f64(),
            self.width,
            self.height,
            if self.is_interlaced { "interlaced" } else { "progressive" },
            self.duration
        )
    }
}

/// Probes `path` and derives its [`StreamSummary`].
pub fn summarize<P: Prober + ?Sized>(prober: &P, path: &Path) -> Result<StreamSummary> {
    info!("Probing video file: {}", path.display());

    let streams = prober.probe(path, ProbeSection::Streams)?;
    let stream = streams[ProbeSection::Streams.key()]
        .get(0)
        .ok_or_else(|| AutoVmafError::probe(path, "no video stream found"))?;

    let width = dimension(stream, "width").ok_or_else(|| AutoVmafError::probe(path, "missing width"))?;
    let height = dimension(stream, "height").ok_or_else(|| AutoVmafError::probe(path, "missing height"))?;
    let frame_rate = stream["r_frame_rate"]
        .as_str()
        .ok_or_else(|| AutoVmafError::probe(path, "missing r_frame_rate"))?
        .parse::<FrameRate>()
        .map_err(|e| AutoVmafError::probe(path, e.to_string()))?;

    let duration = match (number(&stream["duration"]), number(&stream["start_time"])) {
        (Some(duration), Some(start_time)) => derive_duration(duration, start_time),
        _ => {
            debug!("Stream section of {} has no duration, using format section", path.display());
            let format = prober.probe(path, ProbeSection::Format)?;
            let format = &format[ProbeSection::Format.key()];
            let duration = number(&format["duration"])
                .ok_or_else(|| AutoVmafError::probe(path, "missing duration"))?;
            derive_duration(duration, number(&format["start_time"]).unwrap_or(0.0))
        }
    };

    let frames = prober.probe(path, ProbeSection::Frames)?;
    let frames = frames[ProbeSection::Frames.key()]
        .as_array()
        .ok_or_else(|| AutoVmafError::probe(path, "missing frames section"))?;
    let frame_summary = summarize_frames(frames).map_err(|reason| AutoVmafError::probe(path, reason))?;

    let total_packet_bytes = match frame_summary.packet_bytes {
        Some(bytes) => bytes,
        None => {
            let packets = prober.probe(path, ProbeSection::Packets)?;
            packets[ProbeSection::Packets.key()]
                .as_array()
                .ok_or_else(|| AutoVmafError::probe(path, "missing packets section"))?
                .iter()
                .filter_map(|packet| number(&packet["size"]))
                .map(|size| size as u64)
                .sum()
        }
    };

    let summary = StreamSummary {
        path: path.to_path_buf(),
        width,
        height,
        frame_rate,
        interlaced_frames: frame_summary.interlaced,
        total_frames: frame_summary.total,
        interlaced_fraction: frame_summary.fraction,
        is_interlaced: frame_summary.is_interlaced,
        duration,
        total_packet_bytes,
    };
    info!("Detected {}", summary);
    Ok(summary)
}

/// `round(duration - start_time)`, falling back to `round(duration)` when the
/// start correction overshoots.
pub fn derive_duration(duration: f64, start_time: f64) -> f64 {
    let corrected = (duration - start_time).round();
    if corrected < 0.0 {
        duration.round().max(0.0)
    } else {
        corrected
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FrameSummary {
    interlaced: u64,
    total: u64,
    fraction: f64,
    is_interlaced: bool,
    /// `None` when at least one frame lacks `pkt_size`.
    packet_bytes: Option<u64>,
}

fn summarize_frames(frames: &[Value]) -> std::result::Result<FrameSummary, String> {
    let total = frames.len() as u64;
    if total == 0 {
        return Err("no frames found, interlacing cannot be determined".to_string());
    }

    let interlaced = frames
        .iter()
        .filter(|frame| number(&frame["interlaced_frame"]).unwrap_or(0.0) != 0.0)
        .count() as u64;
    let packet_bytes = frames
        .iter()
        .map(|frame| number(&frame["pkt_size"]).map(|size| size as u64))
        .sum::<Option<u64>>();

    let fraction = interlaced as f64 / total as f64;
    Ok(FrameSummary {
        interlaced,
        total,
        fraction,
        is_interlaced: fraction.round() >= 1.0,
        packet_bytes,
    })
}

fn dimension(stream: &Value, key: &str) -> Option<u32> {
    stream[key].as_u64().and_then(|v| u32::try_from(v).ok())
}

/// ffprobe prints most numbers as strings; accept both forms.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
