use std::path::Path;

use polars::prelude::*;
use tracing::{debug, info};

use crate::analysis::noise::{NoiseAxis, NOISE_WORKBOOK};
use crate::comparison::{load_all, Loaded};
use crate::config::Config;
use crate::errors::Result;
use crate::helper_functions::f64_column;
use crate::models::Background;
use crate::plotting::{draw_chart, save_figure, Axes, ErrorPoint, PlotSeries};

/// Bins averaging fewer slices are left out of the comparison plots.
pub const MIN_SLICES: f64 = 3.0;

/// Column prefixes of the three noise measures in the noise sheets.
pub const NOISE_KINDS: [&str; 3] = ["total", "intrinsic", "extrinsic"];

fn kind_title(kind: &str) -> String {
    let mut c = kind.chars();
    match c.next() {
        Some(first) => format!("{}{} noise", first.to_ascii_uppercase(), c.as_str()),
        None => String::new(),
    }
}

fn populated_rows(sheet: &DataFrame) -> Result<Vec<usize>> {
    let counts = f64_column(sheet, "# slices")?;
    Ok(counts
        .iter()
        .enumerate()
        .filter(|(_, c)| c.map_or(false, |c| c >= MIN_SLICES))
        .map(|(i, _)| i)
        .collect())
}

/// Mean vs `kind` noise of a linear sheet, 2·se error bars on both axes.
pub fn linear_points(sheet: &DataFrame, kind: &str) -> Result<Vec<ErrorPoint>> {
    let mean = f64_column(sheet, "mean")?;
    let mean_se = f64_column(sheet, "mean_se")?;
    let value = f64_column(sheet, kind)?;
    let se = f64_column(sheet, &format!("{}_se", kind))?;
    Ok(populated_rows(sheet)?
        .into_iter()
        .filter_map(|i| {
            Some(
                ErrorPoint::new(mean[i]?, value[i]?)
                    .x_err(2.0 * mean_se[i].unwrap_or(0.0))
                    .y_err(2.0 * se[i].unwrap_or(0.0)),
            )
        })
        .collect())
}

/// Log10 mean vs log10 `kind` noise of a `<x> log` sheet with its asymmetric errors.
pub fn log_points(sheet: &DataFrame, kind: &str) -> Result<Vec<ErrorPoint>> {
    let x = f64_column(sheet, "x")?;
    let left = f64_column(sheet, "x_err_left")?;
    let right = f64_column(sheet, "x_err_right")?;
    let value = f64_column(sheet, kind)?;
    let lower = f64_column(sheet, &format!("{}_err_lower", kind))?;
    let upper = f64_column(sheet, &format!("{}_err_upper", kind))?;
    let or_zero = |v: Option<f64>| v.filter(|e| e.is_finite()).unwrap_or(0.0);
    Ok(populated_rows(sheet)?
        .into_iter()
        .filter_map(|i| {
            Some(
                ErrorPoint::new(x[i]?, value[i]?)
                    .asym_x(or_zero(left[i]), or_zero(right[i]))
                    .asym_y(or_zero(lower[i]), or_zero(upper[i])),
            )
        })
        .collect())
}

type PointReader = fn(&DataFrame, &str) -> Result<Vec<ErrorPoint>>;

fn panel_series(loaded: &[Loaded], sheet: &str, kind: &str, read: PointReader, line: bool) -> Result<Vec<PlotSeries>> {
    loaded
        .iter()
        .map(|l| {
            let points = read(l.workbook.sheet(sheet)?, kind)?;
            debug!("{}: {} {} points from {}", l.name, points.len(), kind, sheet);
            let series = PlotSeries::new(l.colour, points).label(&l.name).size(4);
            Ok(if line { series.line() } else { series })
        })
        .collect()
}

fn x_label(axis: NoiseAxis) -> String {
    match axis {
        NoiseAxis::HarmonicMean => "Harmonic mean of her1 and her7 mRNA".to_string(),
        _ => format!("Mean {} mRNA", axis.label()),
    }
}

fn plot_grid(loaded: &[Loaded], config: &Config, path: &Path, log: bool) -> Result<()> {
    let size = (config.figure.width * 2, config.figure.height * 2);
    save_figure(path, size, (3, 4), |panels| {
        for (r, kind) in NOISE_KINDS.iter().enumerate() {
            for (c, axis) in NoiseAxis::ALL.iter().enumerate() {
                let read: PointReader = if log { log_points } else { linear_points };
                let sheet = if log { axis.log_sheet_name() } else { axis.sheet_name().to_string() };
                let series = panel_series(loaded, &sheet, kind, read, false)?;
                let mut axes = Axes::new("", &x_label(*axis), &kind_title(kind));
                if log {
                    axes = axes.log10();
                }
                draw_chart(&panels[r * 4 + c], &axes, &series)?;
            }
        }
        Ok(())
    })
}

pub fn run(backgrounds: &[Background], config: &Config, out_dir: &Path) -> Result<()> {
    info!("Comparing expression noise of {} backgrounds", backgrounds.len());
    let loaded = load_all(backgrounds, NOISE_WORKBOOK)?;

    plot_grid(&loaded, config, &out_dir.join("compare_noise.png"), false)?;
    plot_grid(&loaded, config, &out_dir.join("compare_noise_log.png"), true)?;

    let her_log = NoiseAxis::Her.log_sheet_name();
    let size = (config.figure.width, config.figure.height);
    for kind in NOISE_KINDS {
        let series = panel_series(&loaded, &her_log, kind, log_points, true)?;
        let axes = Axes::new("", &x_label(NoiseAxis::Her), &kind_title(kind)).log10();
        let path = out_dir.join(format!("compare_{}_noise_log.png", kind));
        save_figure(&path, size, (1, 1), |p| draw_chart(&p[0], &axes, &series))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear() -> DataFrame {
        df!(
            "Bin" => [1i64, 2, 3],
            "# slices" => [5i64, 2, 3],
            "mean" => [30.0, 60.0, 90.0],
            "mean_se" => [1.0, 1.0, 2.0],
            "total" => [0.4, 0.3, 0.2],
            "total_se" => [0.01, 0.01, 0.02],
            "intrinsic" => [0.2, 0.1, 0.1],
            "intrinsic_se" => [0.01, 0.01, 0.01],
            "extrinsic" => [0.2, 0.2, 0.1],
            "extrinsic_se" => [0.01, 0.01, 0.01]
        )
        .unwrap()
    }

    #[test]
    fn sparse_bins_are_skipped() {
        let points = linear_points(&linear(), "total").unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].x, 90.0);
        assert_eq!(points[1].x_err, (4.0, 4.0));
        assert_eq!(points[0].y_err, (0.02, 0.02));
    }

    #[test]
    fn log_points_keep_asymmetric_errors() {
        let sheet = df!(
            "Bin" => [1i64, 2],
            "# slices" => [4i64, 6],
            "x" => [Some(1.5), None],
            "x_err_left" => [0.1, 0.1],
            "x_err_right" => [0.05, 0.05],
            "extrinsic" => [Some(-0.7), None],
            "extrinsic_err_lower" => [Some(0.3), None],
            "extrinsic_err_upper" => [Some(0.2), None]
        )
        .unwrap();
        let points = log_points(&sheet, "extrinsic").unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].x_err, (0.1, 0.05));
        assert_eq!(points[0].y_err, (0.3, 0.2));
    }

    #[test]
    fn titles_are_capitalised() {
        assert_eq!(kind_title("intrinsic"), "Intrinsic noise");
    }
}
