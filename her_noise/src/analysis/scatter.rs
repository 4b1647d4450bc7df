use std::path::Path;

use plotters::prelude::BLACK;
use tracing::info;

use crate::analysis::binning::first_bound_at_or_above;
use crate::analysis::noise::COMBINED_SLICES_WORKBOOK;
use crate::config::Config;
use crate::data_handling::workbook::Workbook;
use crate::errors::{NoiseError, Result};
use crate::helper_functions::f64_column;
use crate::plotting::{draw_chart, save_figure, Axes, ErrorPoint, PlotSeries};

/// her1/her7 pairs of every cell, grouped by the her bin of the cell's slice.
pub fn cells_by_her_bin(combined: &Workbook) -> Result<Vec<Vec<(f64, f64)>>> {
    let aggregate = combined.sheet("aggregate_data")?;
    let cells = combined.sheet("cells")?;
    let bounds: Vec<f64> = f64_column(combined.sheet("bin_bounds")?, "her_upper_bound")?
        .into_iter()
        .flatten()
        .collect();

    let her = f64_column(aggregate, "avg_her")?;
    let slice_bin: Vec<Option<usize>> = her
        .iter()
        .map(|h| h.and_then(|v| first_bound_at_or_above(v, &bounds)))
        .collect();

    let slice = f64_column(cells, "slice")?;
    let her1 = f64_column(cells, "her1")?;
    let her7 = f64_column(cells, "her7")?;

    let mut bins = vec![Vec::new(); bounds.len()];
    for ((s, a), b) in slice.iter().zip(&her1).zip(&her7) {
        let (s, a, b) = match (s, a, b) {
            (Some(s), Some(a), Some(b)) => (*s as usize, *a, *b),
            _ => continue,
        };
        let bin = slice_bin.get(s).copied().ok_or_else(|| {
            NoiseError::InvalidInput(format!("cell refers to unknown slice {}", s))
        })?;
        if let Some(bin) = bin {
            bins[bin].push((a, b));
        }
    }
    Ok(bins)
}

fn scatter(path: &Path, size: (u32, u32), title: &str, cells: &[(f64, f64)]) -> Result<()> {
    let points = cells.iter().map(|&(a, b)| ErrorPoint::new(a, b)).collect();
    let series = [PlotSeries::new(BLACK, points).alpha(0.1).size(2)];
    let axes = Axes::new(title, "her1 mRNA", "her7 mRNA")
        .x_range(0.0..200.0)
        .y_range(0.0..200.0);
    save_figure(path, size, (1, 1), |p| draw_chart(&p[0], &axes, &series))
}

/// Draws one her1 vs her7 scatter per her bin plus one of all cells.
pub fn run(config: &Config, out_dir: &Path) -> Result<()> {
    let combined = Workbook::load(out_dir, COMBINED_SLICES_WORKBOOK)?;
    let bins = cells_by_her_bin(&combined)?;
    let size = (config.figure.height, config.figure.height);

    for (i, cells) in bins.iter().enumerate() {
        scatter(
            &out_dir.join(format!("her1_her7_bin{}.png", i)),
            size,
            &format!("Bin {} ({} cells)", i, cells.len()),
            cells,
        )?;
    }
    let all: Vec<(f64, f64)> = bins.concat();
    scatter(&out_dir.join("her1_her7_all.png"), size, "All cells", &all)?;
    info!("Wrote {} her1/her7 scatter plots", bins.len() + 1);
    Ok(())
}
