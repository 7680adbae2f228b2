// src/filters.rs

use crate::error::{AutoVmafError, Result};
use crate::probe::FrameRate;
use std::fmt;

/// Scaler algorithm passed as `flags=` to the scale filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleAlgorithm {
    #[default]
    Bicubic,
}

impl ScaleAlgorithm {
    fn as_str(self) -> &'static str {
        match self {
            ScaleAlgorithm::Bicubic => "bicubic",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    Scale {
        width: u32,
        height: u32,
        algorithm: ScaleAlgorithm,
    },
    /// Delays presentation by `seconds`.
    TimeOffset(f64),
    /// One output frame per input frame (yadif mode 0).
    DeinterlaceFrame,
    /// One output frame per field, doubling the rate (yadif mode 1).
    DeinterlaceField,
    /// Cuts a window and restarts timestamps at zero.
    Trim { start: f64, duration: f64 },
    FrameRate(FrameRate),
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::Scale { width, height, algorithm } => {
                write!(f, "scale={}:{}:flags={}", width, height, algorithm.as_str())
            }
            FilterKind::TimeOffset(seconds) => write!(f, "setpts=PTS+{}/TB", seconds),
            FilterKind::DeinterlaceFrame => f.write_str("yadif=0:-1:0"),
            FilterKind::DeinterlaceField => f.write_str("yadif=1:-1:0"),
            FilterKind::Trim { start, duration } => {
                write!(f, "trim=start={}:duration={},setpts=PTS-STARTPTS", start, duration)
            }
            FilterKind::FrameRate(rate) => write!(f, "fps=fps={}", rate),
        }
    }
}

/// One link of a filter chain: `[input]filter[output]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStage {
    pub input: String,
    pub output: String,
    pub kind: FilterKind,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}[{}]", self.input, self.kind, self.output)
    }
}

/// Ordered filter stages for one ffmpeg input.
///
/// Stage `k` always reads the output label of stage `k - 1`, or the raw
/// input label (`<index>:v`) for the first stage.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChain {
    index: usize,
    stages: Vec<FilterStage>,
}

impl FilterChain {
    pub fn new(index: usize) -> Self {
        FilterChain {
            index,
            stages: Vec::new(),
        }
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn raw_label(&self) -> String {
        format!("{}:v", self.index)
    }

    /// Label the next consumer (stage or metric filter) must read from.
    pub fn last_output(&self) -> String {
        self.stages
            .last()
            .map(|stage| stage.output.clone())
            .unwrap_or_else(|| self.raw_label())
    }

    pub fn count(&self, predicate: impl Fn(&FilterKind) -> bool) -> usize {
        self.stages.iter().filter(|stage| predicate(&stage.kind)).count()
    }

    pub fn scale(&mut self, width: u32, height: u32, algorithm: ScaleAlgorithm) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(AutoVmafError::invalid_parameter(
                "scale",
                format!("{}x{} is not a valid resolution", width, height),
            ));
        }
        self.push(FilterKind::Scale { width, height, algorithm });
        Ok(())
    }

    pub fn set_time_offset(&mut self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() {
            return Err(AutoVmafError::invalid_parameter(
                "setpts",
                format!("offset {} is not a finite number", seconds),
            ));
        }
        self.push(FilterKind::TimeOffset(seconds));
        Ok(())
    }

    pub fn deinterlace_by_frame(&mut self) {
        self.push(FilterKind::DeinterlaceFrame);
    }

    pub fn deinterlace_by_field(&mut self) {
        self.push(FilterKind::DeinterlaceField);
    }

    pub fn trim(&mut self, start: f64, duration: f64) -> Result<()> {
        if !start.is_finite() || start < 0.0 {
            return Err(AutoVmafError::invalid_parameter(
                "trim",
                format!("start {} must be a non-negative number", start),
            ));
        }
        if !duration.is_finite() || duration < 0.0 {
            return Err(AutoVmafError::invalid_parameter(
                "trim",
                format!("duration {} must be a non-negative number", duration),
            ));
        }
        self.push(FilterKind::Trim { start, duration });
        Ok(())
    }

    /// `FrameRate` is positive by construction.
    pub fn set_frame_rate(&mut self, rate: FrameRate) {
        self.push(FilterKind::FrameRate(rate));
    }

    pub fn clear(&mut self) {
        self.stages.clear();
    }

    fn push(&mut self, kind: FilterKind) {
        let input = self.last_output();
        let output = format!("input{}_{}", self.index, self.stages.len());
        self.stages.push(FilterStage { input, output, kind });
    }

    /// Rendered stages, one filtergraph segment each.
    pub fn render(&self) -> Vec<String> {
        self.stages.iter().map(ToString::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_chain_exposes_raw_input_label() {
        let chain = FilterChain::new(1);
        assert_eq!(chain.last_output(), "1:v");
        assert!(chain.render().is_empty());
    }

    #[test]
    fn stages_link_output_to_next_input() {
        let mut chain = FilterChain::new(0);
        chain.scale(1920, 1080, ScaleAlgorithm::Bicubic).unwrap();
        chain.deinterlace_by_frame();
        chain.trim(1.5, 0.5).unwrap();

        let stages = chain.stages();
        assert_eq!(stages[0].input, "0:v");
        for pair in stages.windows(2) {
            assert_eq!(pair[1].input, pair[0].output);
        }
        assert_eq!(chain.last_output(), "input0_2");
        assert_eq!(
            chain.render(),
            vec![
                "[0:v]scale=1920:1080:flags=bicubic[input0_0]",
                "[input0_0]yadif=0:-1:0[input0_1]",
                "[input0_1]trim=start=1.5:duration=0.5,setpts=PTS-STARTPTS[input0_2]",
            ]
        );
    }

    #[test]
    fn remaining_filters_render_ffmpeg_syntax() {
        let mut chain = FilterChain::new(1);
        chain.set_time_offset(2.0).unwrap();
        chain.deinterlace_by_field();
        chain.set_frame_rate(FrameRate { num: 30000, den: 1001 });
        assert_eq!(
            chain.render(),
            vec![
                "[1:v]setpts=PTS+2/TB[input1_0]",
                "[input1_0]yadif=1:-1:0[input1_1]",
                "[input1_1]fps=fps=30000/1001[input1_2]",
            ]
        );
    }

    #[test]
    fn clear_resets_to_raw_label() {
        let mut chain = FilterChain::new(0);
        chain.deinterlace_by_field();
        chain.clear();
        assert!(chain.stages().is_empty());
        assert_eq!(chain.last_output(), "0:v");
        chain.deinterlace_by_frame();
        assert_eq!(chain.stages()[0].input, "0:v");
        assert_eq!(chain.stages()[0].output, "input0_0");
    }

    #[test]
    fn malformed_parameters_are_rejected() {
        let mut chain = FilterChain::new(0);
        assert!(matches!(
            chain.trim(0.0, -1.0),
            Err(AutoVmafError::InvalidFilterParameter { filter: "trim", .. })
        ));
        assert!(chain.trim(-0.5, 1.0).is_err());
        assert!(chain.scale(0, 1080, ScaleAlgorithm::Bicubic).is_err());
        assert!(chain.set_time_offset(f64::NAN).is_err());
        assert!(chain.stages().is_empty());
    }
}
