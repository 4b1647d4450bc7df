use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::analysis::binning::equal_count_bins;
use crate::analysis::noise::SliceNoise;
use crate::analysis::statistics::Summary;
use crate::config::Config;
use crate::data_handling::workbook::Workbook;
use crate::errors::Result;
use crate::helper_functions::{frame, int_col, opt_col};
use crate::models::Gene;
use crate::plotting::{draw_chart, gene_colour, save_figure, Axes, ErrorPoint, Marker, PlotSeries};

pub const FANO_WORKBOOK: &str = "fano_factor";

/// (mean expression, Fano factor) of one equal-count bin.
pub type FanoBin = (Summary, Summary);

pub fn bin_fano(slices: &[SliceNoise], gene: Gene, num_bins: usize) -> Vec<FanoBin> {
    let means: Vec<f64> = slices.iter().map(|s| s.noise.mean_of(gene)).collect();
    let fano: Vec<f64> = slices.iter().map(|s| s.noise.fano(gene)).collect();
    equal_count_bins(&means, &fano, num_bins)
        .into_iter()
        .map(|idx| {
            let m: Vec<f64> = idx.iter().map(|&i| means[i]).collect();
            let f: Vec<f64> = idx.iter().map(|&i| fano[i]).collect();
            (Summary::of(&m), Summary::of(&f))
        })
        .collect()
}

pub fn fano_sheet(bins: &[FanoBin]) -> Result<DataFrame> {
    let filled = |f: &dyn Fn(&FanoBin) -> f64| -> Vec<Option<f64>> {
        bins.iter()
            .map(|b| (!b.0.is_empty()).then(|| f(b)))
            .collect()
    };
    frame(vec![
        int_col("Bin", (1..=bins.len() as i64).collect()),
        opt_col("# slices", filled(&|b| b.0.count as f64)),
        opt_col("Mean RNA level", filled(&|b| b.0.mean)),
        opt_col("Std error", filled(&|b| b.0.se)),
        opt_col("Fano factor", filled(&|b| b.1.mean)),
        opt_col("Fano std error", filled(&|b| b.1.se)),
    ])
}

fn plot_fano(bins: &[(Gene, Vec<FanoBin>)], config: &Config, out_dir: &Path) -> Result<()> {
    let series: Vec<PlotSeries> = bins
        .iter()
        .map(|(gene, bins)| {
            let points = bins
                .iter()
                .filter(|b| !b.0.is_empty())
                .map(|(m, f)| ErrorPoint::new(m.mean, f.mean).x_err(2.0 * m.se).y_err(2.0 * f.se))
                .collect();
            let marker = if *gene == Gene::Her7 { Marker::Square } else { Marker::Circle };
            PlotSeries::new(gene_colour(*gene), points)
                .label(gene.label())
                .marker(marker)
                .size(5)
        })
        .collect();
    let axes = Axes::new("", "Mean mRNA levels", "Fano factor (intrinsic noise x mean)");
    save_figure(&out_dir.join("fano_factor.png"), (config.figure.width, config.figure.height), (1, 1), |p| {
        draw_chart(&p[0], &axes, &series)
    })
}

pub fn run(slices: &[SliceNoise], config: &Config, out_dir: &Path) -> Result<()> {
    info!("Binning Fano factors of {} slices", slices.len());
    let bins: Vec<(Gene, Vec<FanoBin>)> = Gene::REPORTERS
        .iter()
        .map(|&g| (g, bin_fano(slices, g, config.fano_bins)))
        .collect();

    let mut wb = Workbook::new(FANO_WORKBOOK);
    for (gene, b) in &bins {
        wb.add_sheet(gene.sheet_name(), fano_sheet(b)?);
    }
    wb.save(out_dir)?;
    plot_fano(&bins, config, out_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::statistics::decompose;
    use crate::helper_functions::f64_column;
    use crate::models::Cell;
    use assert_approx_eq::assert_approx_eq;

    fn slice(scale: f64) -> SliceNoise {
        let cells = vec![
            Cell::new(scale, scale),
            Cell::new(2.0 * scale, scale),
            Cell::new(3.0 * scale, 2.0 * scale),
        ];
        SliceNoise {
            noise: decompose(&cells, 3).unwrap(),
            her1_cv2: 0.0,
            her7_cv2: 0.0,
            cells,
        }
    }

    #[test]
    fn bins_hold_equal_counts_of_sorted_slices() {
        let slices: Vec<SliceNoise> = [5.0, 1.0, 3.0, 2.0, 4.0, 6.0].iter().map(|&s| slice(s)).collect();
        let bins = bin_fano(&slices, Gene::Her1, 5);
        let counts: Vec<usize> = bins.iter().map(|b| b.0.count).collect();
        assert_eq!(counts, vec![1, 1, 1, 1, 2]);
        // her1 mean is 2 * scale
        assert_approx_eq!(bins[0].0.mean, 2.0);
        assert_approx_eq!(bins[4].0.mean, 11.0);

        // intrinsic noise is scale invariant, so Fano grows linearly with the mean
        let intrinsic = slices[1].noise.intrinsic;
        assert_approx_eq!(bins[0].1.mean, intrinsic * 2.0);
    }

    #[test]
    fn sheet_blanks_empty_bins() {
        let slices = vec![slice(1.0), slice(2.0)];
        let bins = bin_fano(&slices, Gene::Her7, 5);
        let df = fano_sheet(&bins).unwrap();
        assert_eq!(df.height(), 5);
        let counts = f64_column(&df, "# slices").unwrap();
        assert_eq!(counts, vec![None, None, None, None, Some(2.0)]);
        assert!(f64_column(&df, "Fano factor").unwrap()[0].is_none());
    }
}
