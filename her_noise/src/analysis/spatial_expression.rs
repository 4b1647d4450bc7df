use std::path::Path;

use plotters::prelude::{BLUE, RED};
use plotters::style::RGBColor;
use polars::prelude::*;
use tracing::{debug, info};

use crate::analysis::statistics::{mean, population_std};
use crate::config::{Config, SmoothingConfig};
use crate::data_handling::workbook::Workbook;
use crate::errors::Result;
use crate::helper_functions::{frame, int_col, num_col};
use crate::models::{EmbryoSlices, Gene, RegionSlices};
use crate::plotting::{draw_chart, save_figure, Axes, ErrorPoint, PlotSeries, DARK_GREEN};

pub const SPATIAL_EXPRESSION_WORKBOOK: &str = "spatial_expression";

const COLOURS: [RGBColor; 3] = [BLUE, RED, DARK_GREEN];

/// Per slice expression of one gene in one region. NaN marks slices without data.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionTrack {
    pub gene: Gene,
    pub mean: Vec<f64>,
    pub se: Vec<f64>,
    /// Smoothed values over `span`, NaN outside.
    pub smooth: Vec<f64>,
    pub span: (usize, usize),
}

/// Clamped per-cell value: her is clamped after summing the two reporters.
fn clamped_value(gene: Gene, her1: f64, her7: f64) -> f64 {
    let v = match gene {
        Gene::Her1 => her1,
        Gene::Her7 => her7,
        Gene::Her => her1 + her7,
    };
    v.max(0.0)
}

/// Mean and standard error per slice of a region.
pub fn slice_expression(region: &RegionSlices, gene: Gene) -> (Vec<f64>, Vec<f64>) {
    region
        .rows
        .iter()
        .map(|row| match &row.cells {
            Some(cells) => {
                let values: Vec<f64> = cells.iter().map(|c| clamped_value(gene, c.her1, c.her7)).collect();
                let se = population_std(&values) / (values.len() as f64).sqrt();
                (mean(&values), se)
            }
            None => (f64::NAN, f64::NAN),
        })
        .unzip()
}

/// Fills single missing values with the mean of their neighbours, then
/// pairs of missing values with the mean of the two outer neighbours.
pub fn interpolate(x: &mut [f64]) {
    let n = x.len();
    for i in 1..n.saturating_sub(1) {
        if x[i].is_nan() && !x[i - 1].is_nan() && !x[i + 1].is_nan() {
            x[i] = (x[i - 1] + x[i + 1]) / 2.0;
        }
    }
    for i in 1..n.saturating_sub(2) {
        if x[i].is_nan() && x[i + 1].is_nan() && !x[i - 1].is_nan() && !x[i + 2].is_nan() {
            let fill = (x[i - 1] + x[i + 2]) / 2.0;
            x[i] = fill;
            x[i + 1] = fill;
        }
    }
}

/// Half-open range from the first to one past the last non-missing value.
pub fn determine_start_end(x: &[f64]) -> (usize, usize) {
    let start = x.iter().position(|v| !v.is_nan()).unwrap_or(x.len());
    let end = x.iter().rposition(|v| !v.is_nan()).map_or(start, |j| j + 1);
    (start, end.max(start))
}

fn reflect_index(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period) as usize;
    if m < n {
        m
    } else {
        2 * n - 1 - m
    }
}

/// One-dimensional Gaussian filter with half-sample symmetric boundaries,
/// kernel radius `truncate * sigma` rounded.
pub fn gaussian_filter(x: &[f64], sigma: f64, truncate: f64) -> Vec<f64> {
    if x.is_empty() {
        return Vec::new();
    }
    let radius = (truncate * sigma + 0.5) as isize;
    let mut weights: Vec<f64> = (-radius..=radius)
        .map(|k| (-0.5 * (k as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= total);

    (0..x.len() as isize)
        .map(|i| {
            weights
                .iter()
                .zip(-radius..=radius)
                .map(|(w, k)| w * x[reflect_index(i + k, x.len())])
                .sum()
        })
        .collect()
}

/// Filters consecutive windows of `window` values, writing each result back before the next window.
pub fn smoothen(x: &mut [f64], smoothing: &SmoothingConfig) {
    let window = smoothing.window;
    if window == 0 || x.len() < window {
        return;
    }
    for start in 0..=x.len() - window {
        let filtered = gaussian_filter(&x[start..start + window], smoothing.sigma, smoothing.truncate);
        x[start..start + window].copy_from_slice(&filtered);
    }
}

pub fn expression_track(region: &RegionSlices, gene: Gene, smoothing: &SmoothingConfig) -> ExpressionTrack {
    let (mean, se) = slice_expression(region, gene);
    let mut filled = mean.clone();
    interpolate(&mut filled);
    let span = determine_start_end(&filled);
    let mut smooth = vec![f64::NAN; filled.len()];
    let mut section = filled[span.0..span.1].to_vec();
    smoothen(&mut section, smoothing);
    smooth[span.0..span.1].copy_from_slice(&section);
    ExpressionTrack {
        gene,
        mean,
        se,
        smooth,
        span,
    }
}

pub fn region_sheet(tracks: &[ExpressionTrack]) -> Result<DataFrame> {
    let n = tracks.first().map_or(0, |t| t.mean.len());
    let mut columns = vec![int_col("Cell position", (0..n as i64).collect())];
    for t in tracks {
        let name = t.gene.sheet_name();
        columns.push(num_col(&format!("{} raw mean", name), &t.mean));
        columns.push(num_col(&format!("{} std error", name), &t.se));
        columns.push(num_col(&format!("{} smooth mean", name), &t.smooth));
    }
    frame(columns)
}

fn raw_series(track: &ExpressionTrack, colour: RGBColor) -> PlotSeries {
    let points = track
        .mean
        .iter()
        .zip(&track.se)
        .enumerate()
        .map(|(i, (m, s))| ErrorPoint::new(i as f64, *m).y_err(2.0 * s))
        .collect();
    PlotSeries::new(colour, points).size(3)
}

fn track_axes(track: &ExpressionTrack) -> Axes {
    let (start, end) = track.span;
    Axes::new("", "Cell position (posterior - anterior)", &format!("{} mRNA", track.gene))
        .x_range((start as f64 - 2.0)..(end as f64 + 1.0))
}

fn plot_region(name: &str, tracks: &[ExpressionTrack], config: &Config, out_dir: &Path) -> Result<()> {
    save_figure(&out_dir.join(format!("{}_spatial_expression.png", name)), (config.figure.width, config.figure.width), (3, 2), |panels| {
        for (i, t) in tracks.iter().enumerate() {
            draw_chart(&panels[2 * i], &track_axes(t), &[raw_series(t, COLOURS[i])])?;
            let smooth: Vec<ErrorPoint> = t
                .smooth
                .iter()
                .enumerate()
                .map(|(x, y)| ErrorPoint::new(x as f64, *y))
                .collect();
            draw_chart(&panels[2 * i + 1], &track_axes(t), &[PlotSeries::new(COLOURS[i], smooth).size(3)])?;
        }
        Ok(())
    })?;

    for (i, t) in tracks.iter().enumerate().take(2) {
        let path = out_dir.join(format!("{}_raw_{}.png", name, t.gene.label()));
        save_figure(&path, (config.figure.width, config.figure.height * 2 / 3), (1, 1), |p| {
            draw_chart(&p[0], &track_axes(t), &[raw_series(t, COLOURS[i])])
        })?;
    }
    Ok(())
}

/// Raw and smoothed spatial expression of a single embryo, one sheet per region.
pub fn run(embryo: &EmbryoSlices, config: &Config, out_dir: &Path) -> Result<()> {
    info!("Plotting spatial expression of {}", embryo.source.display());
    let mut wb = Workbook::new(SPATIAL_EXPRESSION_WORKBOOK);
    for region in &embryo.regions {
        let tracks: Vec<ExpressionTrack> = Gene::ALL
            .iter()
            .map(|&g| expression_track(region, g, &config.smoothing))
            .collect();
        debug!(
            "{} region: valid span {:?} of {} slices",
            region.region.name(),
            tracks[0].span,
            region.rows.len()
        );
        wb.add_sheet(region.region.name(), region_sheet(&tracks)?);
        plot_region(region.region.name(), &tracks, config, out_dir)?;
    }
    wb.save(out_dir)?;
    Ok(())
}
