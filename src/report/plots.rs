//! Comparison plots
//!
//! One PNG per experiment: a row of panels, one line per configuration.

use std::ops::Range;
use std::path::Path;

use plotters::prelude::*;

use crate::experiment::ExperimentResults;
use crate::training::TrainingHistory;
use crate::{LabError, Result};

const PANEL_SIZE: (u32, u32) = (750, 500);

/// Per-epoch series that can be plotted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    TrainLoss,
    TestAccuracy,
    LearningRate,
}

impl Metric {
    pub fn series<'a>(&self, history: &'a TrainingHistory) -> &'a [f64] {
        match self {
            Metric::TrainLoss => &history.train_loss,
            Metric::TestAccuracy => &history.test_acc,
            Metric::LearningRate => &history.lr,
        }
    }
}

/// One chart in a comparison figure
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub metric: Metric,
    pub title: String,
    pub y_label: String,
    pub log_scale: bool,
}

impl Panel {
    pub fn new(metric: Metric, title: impl Into<String>, y_label: impl Into<String>) -> Self {
        Panel {
            metric,
            title: title.into(),
            y_label: y_label.into(),
            log_scale: false,
        }
    }

    /// Plot the y axis on a base-10 log scale
    pub fn log_scale(mut self) -> Self {
        self.log_scale = true;
        self
    }

    /// (epoch, value) points for one history, epochs one-based.
    ///
    /// On a log-scale panel values are mapped to log10 and non-positive
    /// values are dropped.
    pub fn points(&self, history: &TrainingHistory) -> Vec<(f64, f64)> {
        self.metric
            .series(history)
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite() && (!self.log_scale || **v > 0.0))
            .map(|(i, &v)| {
                let y = if self.log_scale { v.log10() } else { v };
                ((i + 1) as f64, y)
            })
            .collect()
    }
}

/// Padded axis ranges covering every point
pub fn axis_bounds<'a>(
    points: impl IntoIterator<Item = &'a (f64, f64)>,
) -> Option<(Range<f64>, Range<f64>)> {
    let mut iter = points.into_iter().peekable();
    iter.peek()?;

    let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(x, y) in iter {
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }

    let y_pad = if y_max > y_min {
        (y_max - y_min) * 0.05
    } else {
        y_min.abs().max(1.0) * 0.05
    };
    let x_max = if x_max > x_min { x_max } else { x_min + 1.0 };

    Some((x_min..x_max, (y_min - y_pad)..(y_max + y_pad)))
}

fn reporting<E: std::fmt::Display>(err: E) -> LabError {
    LabError::Reporting(err.to_string())
}

/// Render the panels side by side into a PNG at `path`
pub fn render_comparison(
    results: &ExperimentResults,
    panels: &[Panel],
    title: &str,
    path: &Path,
) -> Result<()> {
    if results.is_empty() {
        return Err(LabError::Reporting(format!(
            "no completed runs to plot for {}",
            title
        )));
    }
    if panels.is_empty() {
        return Err(LabError::Reporting("no panels requested".to_string()));
    }

    let size = (PANEL_SIZE.0 * panels.len() as u32, PANEL_SIZE.1);
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(reporting)?;
    let root = root
        .titled(title, ("sans-serif", 24))
        .map_err(reporting)?;

    let areas = root.split_evenly((1, panels.len()));
    for (area, panel) in areas.iter().zip(panels) {
        draw_panel(area, panel, results)?;
    }

    root.present().map_err(reporting)?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    panel: &Panel,
    results: &ExperimentResults,
) -> Result<()> {
    let lines: Vec<(&str, Vec<(f64, f64)>)> = results
        .iter()
        .map(|(name, history)| (name, panel.points(history)))
        .collect();

    let Some((x_range, y_range)) = axis_bounds(lines.iter().flat_map(|(_, pts)| pts)) else {
        return Err(LabError::Reporting(format!(
            "no finite values for panel {}",
            panel.title
        )));
    };

    let mut chart = ChartBuilder::on(area)
        .caption(&panel.title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)
        .map_err(reporting)?;

    let log_scale = panel.log_scale;
    let y_format = move |v: &f64| {
        if log_scale {
            format!("{:.0e}", 10f64.powf(*v))
        } else {
            format!("{:.2}", v)
        }
    };
    chart
        .configure_mesh()
        .x_desc("Epoch")
        .y_desc(panel.y_label.as_str())
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&y_format)
        .draw()
        .map_err(reporting)?;

    for (idx, (name, points)) in lines.iter().enumerate() {
        let color = Palette99::pick(idx).mix(0.9);
        chart
            .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))
            .map_err(reporting)?
            .label(*name)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
        chart
            .draw_series(
                points
                    .iter()
                    .map(|&p| Circle::new(p, 3, color.filled())),
            )
            .map_err(reporting)?;
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(reporting)?;

    Ok(())
}
