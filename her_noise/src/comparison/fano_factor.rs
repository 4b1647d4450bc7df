use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::analysis::fano_factor::FANO_WORKBOOK;
use crate::comparison::{load_all, Loaded};
use crate::config::Config;
use crate::errors::Result;
use crate::helper_functions::f64_column;
use crate::models::{Background, Gene};
use crate::plotting::{draw_chart, save_figure, Axes, ErrorPoint, Marker, PlotSeries};

/// Filled bins of a Fano factor sheet as points with 2·se error bars on both axes.
pub fn fano_points(sheet: &DataFrame) -> Result<Vec<ErrorPoint>> {
    let mean = f64_column(sheet, "Mean RNA level")?;
    let mean_se = f64_column(sheet, "Std error")?;
    let fano = f64_column(sheet, "Fano factor")?;
    let fano_se = f64_column(sheet, "Fano std error")?;
    let points = (0..sheet.height())
        .filter_map(|i| {
            let (m, f) = (mean[i]?, fano[i]?);
            Some(
                ErrorPoint::new(m, f)
                    .x_err(2.0 * mean_se[i].unwrap_or(0.0))
                    .y_err(2.0 * fano_se[i].unwrap_or(0.0)),
            )
        })
        .collect();
    Ok(points)
}

pub fn fano_series(loaded: &[Loaded]) -> Result<Vec<PlotSeries>> {
    let mut series = Vec::new();
    for l in loaded {
        for gene in Gene::REPORTERS {
            let points = fano_points(l.workbook.sheet(gene.sheet_name())?)?;
            let marker = if gene == Gene::Her7 { Marker::Square } else { Marker::Circle };
            series.push(
                PlotSeries::new(l.colour, points)
                    .label(&format!("{} {}", l.name, gene.label()))
                    .marker(marker)
                    .size(5),
            );
        }
    }
    Ok(series)
}

pub fn run(backgrounds: &[Background], config: &Config, out_dir: &Path) -> Result<()> {
    info!("Comparing Fano factors of {} backgrounds", backgrounds.len());
    let loaded = load_all(backgrounds, FANO_WORKBOOK)?;
    let series = fano_series(&loaded)?;
    let axes = Axes::new("", "Mean mRNA levels", "Fano factor (intrinsic noise x mean)");
    let size = (config.figure.width, config.figure.height);
    save_figure(&out_dir.join("compare_fano_factor.png"), size, (1, 1), |p| {
        draw_chart(&p[0], &axes, &series)
    })
}
