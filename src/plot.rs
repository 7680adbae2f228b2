// src/plot.rs

use crate::error::{AutoVmafError, Result};
use log::{error, info};
use plotters::prelude::*;
use plotters::style::full_palette::{GREEN, ORANGE};
use quantiles::ckms::CKMS;
use std::path::{Path, PathBuf};

/// Summary lines drawn over the per-frame scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreStats {
    pub mean: f64,
    pub perc_1: f64,
    pub perc_25: f64,
    pub perc_75: f64,
    pub min: f64,
    pub max: f64,
}

impl ScoreStats {
    pub fn from_scores(scores: &[(u64, f64)]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        let mut values: Vec<f64> = scores.iter().map(|(_, s)| *s).collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut quantiles_data = CKMS::<f64>::new(0.001);
        for score in &values {
            quantiles_data.insert(*score);
        }
        // CKMS returns a rank into the sorted stream.
        let percentile = |quantile: f64| -> f64 {
            quantiles_data
                .query(quantile)
                .map(|(rank, _)| {
                    let index = rank.min(values.len().saturating_sub(1));
                    values.get(index).copied().unwrap_or(f64::NAN)
                })
                .unwrap_or(f64::NAN)
        };

        Some(ScoreStats {
            mean,
            perc_1: percentile(0.01),
            perc_25: percentile(0.25),
            perc_75: percentile(0.75),
            min: values[0],
            max: values[values.len() - 1],
        })
    }
}

/// `<report>.png` next to the report.
pub fn plot_path(report_path: &Path) -> PathBuf {
    report_path.with_extension("png")
}

/// Renders the per-frame scores of one report field with mean and
/// percentile lines.
pub fn generate_plot(scores: &[(u64, f64)], field: &str, output_path: &Path) -> Result<()> {
    info!("Generating {} plot: {}", field, output_path.display());

    let stats = ScoreStats::from_scores(scores).ok_or_else(|| {
        error!("No {} scores found to plot for {}", field, output_path.display());
        AutoVmafError::Plot(format!("No {} scores to plot", field))
    })?;

    let root = BitMapBackend::new(output_path, (1280, 720)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| AutoVmafError::Plot(format!("Failed to fill plot background: {}", e)))?;

    let y_min = stats.perc_1.floor().max(0.0).min(95.0);
    let y_max = stats.max.ceil().max(100.0) + 0.5;
    let x_min = scores.first().map(|(i, _)| *i).unwrap_or(0);
    let x_max = scores.last().map(|(i, _)| *i).unwrap_or(0).max(x_min + 1);

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{} ({} frames)", field, scores.len()), ("sans-serif", 24).into_font())
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| AutoVmafError::Plot(format!("Failed to build chart: {}", e)))?;

    let y_label_format = |y: &f64| format!("{:.1}", y);
    chart
        .configure_mesh()
        .x_desc("Frame Number")
        .y_desc(format!("{} Score", field))
        .y_label_formatter(&y_label_format)
        .axis_desc_style(("sans-serif", 16))
        .label_style(("sans-serif", 14))
        .y_max_light_lines(10)
        .y_labels(10)
        .draw()
        .map_err(|e| AutoVmafError::Plot(format!("Failed to draw mesh: {:?}", e)))?;

    chart
        .draw_series(LineSeries::new(scores.iter().copied(), BLUE.mix(0.8).stroke_width(1)))
        .map_err(|e| AutoVmafError::Plot(format!("Failed to draw scores: {:?}", e)))?
        .label(format!("{} Scores", field))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.filled()));

    let stat_lines = [
        (format!("Mean: {:.2}", stats.mean), stats.mean, BLACK),
        (format!("1%:   {:.2}", stats.perc_1), stats.perc_1, RED),
        (format!("25%: {:.2}", stats.perc_25), stats.perc_25, ORANGE),
        (format!("75%: {:.2}", stats.perc_75), stats.perc_75, GREEN),
    ];
    for (label, value, color) in stat_lines {
        chart
            .draw_series(LineSeries::new(vec![(x_min, value), (x_max, value)], get_stat_line_style(color)))
            .map_err(|e| AutoVmafError::Plot(format!("Failed to draw '{}' line: {:?}", label, e)))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], get_stat_line_style(color)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerMiddle)
        .margin(10)
        .label_font(("sans-serif", 12))
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| AutoVmafError::Plot(format!("Failed to draw legend: {:?}", e)))?;

    root.present()
        .map_err(|e| AutoVmafError::Plot(format!("Failed to save plot: {:?}", e)))?;
    info!("Successfully generated {} plot: {}", field, output_path.display());
    Ok(())
}

fn get_stat_line_style(color: RGBColor) -> ShapeStyle {
    ShapeStyle {
        color: color.to_rgba(),
        filled: false,
        stroke_width: 1,
    }
}
