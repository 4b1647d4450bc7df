use std::path::Path;

use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::analysis::binning::{equal_width_bounds, group_by_bounds};
use crate::analysis::statistics::{cv_squared, decompose, LogPoint, NoiseDecomposition, Summary};
use crate::config::Config;
use crate::data_handling::workbook::Workbook;
use crate::errors::Result;
use crate::helper_functions::{frame, int_col, num_col, str_col};
use crate::models::{Cell, EmbryoSlices};
use crate::plotting::{draw_chart, save_figure, Axes, ErrorPoint, PlotSeries, NOISE_COLOURS};

pub const NOISE_WORKBOOK: &str = "noise";
pub const COMBINED_SLICES_WORKBOOK: &str = "combined_slices";
pub const HISTOGRAM_WORKBOOK: &str = "histogram_her";

/// A valid slice of any embryo and region, with its retained cells.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceNoise {
    pub noise: NoiseDecomposition,
    pub her1_cv2: f64,
    pub her7_cv2: f64,
    pub cells: Vec<Cell>,
}

/// Every slice with at least `min_cells` positive pairs, in embryo, region, position order.
pub fn collect_slice_noise(embryos: &[EmbryoSlices], min_cells: usize) -> Vec<SliceNoise> {
    let mut slices = Vec::new();
    for embryo in embryos {
        for region in &embryo.regions {
            for row in region.rows.iter().filter(|r| r.is_valid()) {
                let cells = row.positive_cells();
                if let Some(noise) = decompose(&cells, min_cells) {
                    let her1: Vec<f64> = cells.iter().map(|c| c.her1).collect();
                    let her7: Vec<f64> = cells.iter().map(|c| c.her7).collect();
                    slices.push(SliceNoise {
                        noise,
                        her1_cv2: cv_squared(&her1),
                        her7_cv2: cv_squared(&her7),
                        cells,
                    });
                }
            }
        }
    }
    slices
}

/// Expression measure on the x axis of a noise plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseAxis {
    Her1,
    Her7,
    Her,
    HarmonicMean,
}

impl NoiseAxis {
    pub const ALL: [NoiseAxis; 4] = [
        NoiseAxis::Her1,
        NoiseAxis::Her7,
        NoiseAxis::Her,
        NoiseAxis::HarmonicMean,
    ];

    pub fn sheet_name(&self) -> &'static str {
        match self {
            NoiseAxis::Her1 => "Her1",
            NoiseAxis::Her7 => "Her7",
            NoiseAxis::Her => "Her",
            NoiseAxis::HarmonicMean => "Harmonic mean",
        }
    }

    pub fn log_sheet_name(&self) -> String {
        format!("{} log", self.sheet_name())
    }

    pub fn label(&self) -> &'static str {
        match self {
            NoiseAxis::Her1 => "her1",
            NoiseAxis::Her7 => "her7",
            NoiseAxis::Her => "her",
            NoiseAxis::HarmonicMean => "harmonic_mean",
        }
    }

    pub fn value(&self, noise: &NoiseDecomposition) -> f64 {
        match self {
            NoiseAxis::Her1 => noise.her1_mean,
            NoiseAxis::Her7 => noise.her7_mean,
            NoiseAxis::Her => noise.her_mean(),
            NoiseAxis::HarmonicMean => noise.harmonic_mean(),
        }
    }
}

/// Noise of the slices whose mean falls in one fixed-edge bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseBin {
    pub mean: Summary,
    pub total: Summary,
    pub intrinsic: Summary,
    pub extrinsic: Summary,
}

pub fn bin_noise(slices: &[SliceNoise], axis: NoiseAxis, edges: &[f64]) -> Vec<NoiseBin> {
    let keys: Vec<f64> = slices.iter().map(|s| axis.value(&s.noise)).collect();
    group_by_bounds(&keys, edges)
        .into_iter()
        .map(|idx| {
            let pick = |f: &dyn Fn(&SliceNoise) -> f64| -> Vec<f64> {
                idx.iter().map(|&i| f(&slices[i])).collect()
            };
            NoiseBin {
                mean: Summary::of(&pick(&|s: &SliceNoise| axis.value(&s.noise))),
                total: Summary::of(&pick(&|s: &SliceNoise| s.noise.total)),
                intrinsic: Summary::of(&pick(&|s: &SliceNoise| s.noise.intrinsic)),
                extrinsic: Summary::of(&pick(&|s: &SliceNoise| s.noise.extrinsic)),
            }
        })
        .collect()
}

/// (mean, CV²) summaries of one reporter per fixed-edge bin.
pub fn bin_single_gene(slices: &[SliceNoise], her1: bool, edges: &[f64]) -> Vec<(Summary, Summary)> {
    let mean = |s: &SliceNoise| if her1 { s.noise.her1_mean } else { s.noise.her7_mean };
    let cv2 = |s: &SliceNoise| if her1 { s.her1_cv2 } else { s.her7_cv2 };
    let keys: Vec<f64> = slices.iter().map(mean).collect();
    group_by_bounds(&keys, edges)
        .into_iter()
        .map(|idx| {
            let m: Vec<f64> = idx.iter().map(|&i| mean(&slices[i])).collect();
            let c: Vec<f64> = idx.iter().map(|&i| cv2(&slices[i])).collect();
            (Summary::of(&m), Summary::of(&c))
        })
        .collect()
}

fn bin_numbers(n: usize) -> Vec<i64> {
    (1..=n as i64).collect()
}

fn summary_columns(name: &str, values: &[Summary]) -> [Column; 2] {
    let means: Vec<f64> = values.iter().map(|s| s.mean).collect();
    let ses: Vec<f64> = values.iter().map(|s| s.se).collect();
    [num_col(name, &means), num_col(&format!("{}_se", name), &ses)]
}

pub fn noise_sheet(bins: &[NoiseBin]) -> Result<DataFrame> {
    let mean: Vec<Summary> = bins.iter().map(|b| b.mean).collect();
    let total: Vec<Summary> = bins.iter().map(|b| b.total).collect();
    let intrinsic: Vec<Summary> = bins.iter().map(|b| b.intrinsic).collect();
    let extrinsic: Vec<Summary> = bins.iter().map(|b| b.extrinsic).collect();

    let mut columns = vec![
        int_col("Bin", bin_numbers(bins.len())),
        int_col("# slices", bins.iter().map(|b| b.mean.count as i64).collect()),
    ];
    columns.extend(summary_columns("mean", &mean));
    columns.extend(summary_columns("total", &total));
    columns.extend(summary_columns("intrinsic", &intrinsic));
    columns.extend(summary_columns("extrinsic", &extrinsic));
    frame(columns)
}

/// Log10 view of the bins holding more than one slice; others are left blank.
pub fn log_rows(bins: &[NoiseBin]) -> Vec<Option<[LogPoint; 4]>> {
    bins.iter()
        .map(|b| {
            if b.mean.count <= 1 {
                return None;
            }
            Some([
                LogPoint::of(b.mean.mean, b.mean.se),
                LogPoint::of(b.total.mean, b.total.se),
                LogPoint::of(b.intrinsic.mean, b.intrinsic.se),
                LogPoint::non_negative(b.extrinsic.mean, b.extrinsic.se),
            ])
        })
        .collect()
}

pub fn log_sheet(bins: &[NoiseBin]) -> Result<DataFrame> {
    let rows = log_rows(bins);
    let mut columns = vec![
        int_col("Bin", bin_numbers(bins.len())),
        int_col("# slices", bins.iter().map(|b| b.mean.count as i64).collect()),
    ];
    let names = [
        ("x", "x_err_left", "x_err_right"),
        ("total", "total_err_lower", "total_err_upper"),
        ("intrinsic", "intrinsic_err_lower", "intrinsic_err_upper"),
        ("extrinsic", "extrinsic_err_lower", "extrinsic_err_upper"),
    ];
    for (k, (value, lower, upper)) in names.iter().enumerate() {
        let pick = |f: fn(&LogPoint) -> f64| -> Vec<f64> {
            rows.iter()
                .map(|r| r.as_ref().map_or(f64::NAN, |p| f(&p[k])))
                .collect()
        };
        columns.push(num_col(value, &pick(|p: &LogPoint| p.value)));
        columns.push(num_col(lower, &pick(|p: &LogPoint| p.lower)));
        columns.push(num_col(upper, &pick(|p: &LogPoint| p.upper)));
    }
    frame(columns)
}

pub fn single_noise_sheet(bins: &[(Summary, Summary)]) -> Result<DataFrame> {
    let mean: Vec<Summary> = bins.iter().map(|b| b.0).collect();
    let cv2: Vec<Summary> = bins.iter().map(|b| b.1).collect();
    let mut columns = vec![
        int_col("Bin", bin_numbers(bins.len())),
        int_col("# slices", bins.iter().map(|b| b.0.count as i64).collect()),
    ];
    columns.extend(summary_columns("mean", &mean));
    columns.extend(summary_columns("total", &cv2));
    frame(columns)
}

/// Intrinsic (type 1) and extrinsic (type 2) noise of each slice, split into low and
/// high expression at half the her range.
pub fn one_way_anova_sheet(slices: &[SliceNoise]) -> Result<DataFrame> {
    let her: Vec<f64> = slices.iter().map(|s| s.noise.her_mean()).collect();
    let threshold = crate::analysis::statistics::min_max(&her)
        .map(|(lo, hi)| (hi - lo) / 2.0)
        .unwrap_or(0.0);

    let mut group = Vec::new();
    let mut noise_type = Vec::new();
    let mut level = Vec::new();
    for s in slices {
        let label = if s.noise.her_mean() < threshold { "low" } else { "high" };
        for (t, v) in [(1, s.noise.intrinsic), (2, s.noise.extrinsic)] {
            group.push(label.to_string());
            noise_type.push(t);
            level.push(v);
        }
    }
    frame(vec![
        str_col("expression", group),
        int_col("noise type", noise_type),
        num_col("noise level", &level),
    ])
}

pub fn spss_bin_sheet(slices: &[SliceNoise], edges: &[f64]) -> Result<DataFrame> {
    let keys: Vec<f64> = slices.iter().map(|s| s.noise.her_mean()).collect();
    let mut bin = Vec::new();
    let (mut mean, mut total, mut intrinsic, mut extrinsic) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    for (b, idx) in group_by_bounds(&keys, edges).iter().enumerate() {
        for &i in idx {
            let n = &slices[i].noise;
            bin.push(b as i64 + 1);
            mean.push(n.her_mean());
            total.push(n.total);
            intrinsic.push(n.intrinsic);
            extrinsic.push(n.extrinsic);
        }
    }
    frame(vec![
        int_col("bin", bin),
        num_col("slice mean", &mean),
        num_col("total", &total),
        num_col("intrinsic", &intrinsic),
        num_col("extrinsic", &extrinsic),
    ])
}

pub fn spss_single_bin_sheet(slices: &[SliceNoise], her1: bool, edges: &[f64]) -> Result<DataFrame> {
    let keys: Vec<f64> = slices
        .iter()
        .map(|s| if her1 { s.noise.her1_mean } else { s.noise.her7_mean })
        .collect();
    let mut bin = Vec::new();
    let (mut mean, mut total) = (Vec::new(), Vec::new());
    for (b, idx) in group_by_bounds(&keys, edges).iter().enumerate() {
        for &i in idx {
            bin.push(b as i64 + 1);
            mean.push(keys[i]);
            total.push(if her1 { slices[i].her1_cv2 } else { slices[i].her7_cv2 });
        }
    }
    frame(vec![
        int_col("bin", bin),
        num_col("slice mean", &mean),
        num_col("total", &total),
    ])
}

/// Per-slice aggregates, the cells of each slice and equal-width her bin bounds.
pub fn combined_slices_workbook(slices: &[SliceNoise], num_bins: usize) -> Result<Workbook> {
    let pick = |f: &dyn Fn(&SliceNoise) -> f64| -> Vec<f64> { slices.iter().map(f).collect() };
    let her = pick(&|s: &SliceNoise| s.noise.her_mean());

    let aggregate = frame(vec![
        int_col("slice", (0..slices.len() as i64).collect()),
        num_col("avg_her", &her),
        num_col("avg_her1", &pick(&|s: &SliceNoise| s.noise.her1_mean)),
        num_col("avg_her7", &pick(&|s: &SliceNoise| s.noise.her7_mean)),
        num_col("avg_harmonic_mean", &pick(&|s: &SliceNoise| s.noise.harmonic_mean())),
        num_col("intrinsic", &pick(&|s: &SliceNoise| s.noise.intrinsic)),
        num_col("extrinsic", &pick(&|s: &SliceNoise| s.noise.extrinsic)),
        num_col("total_noise", &pick(&|s: &SliceNoise| s.noise.total)),
        int_col("num_cells", slices.iter().map(|s| s.cells.len() as i64).collect()),
    ])?;

    let mut slice_idx = Vec::new();
    let (mut her1, mut her7) = (Vec::new(), Vec::new());
    for (i, s) in slices.iter().enumerate() {
        for c in &s.cells {
            slice_idx.push(i as i64);
            her1.push(c.her1);
            her7.push(c.her7);
        }
    }
    let cells = frame(vec![
        int_col("slice", slice_idx),
        num_col("her1", &her1),
        num_col("her7", &her7),
    ])?;

    let bounds = equal_width_bounds(&her, num_bins);
    let bin_bounds = frame(vec![
        int_col("bin", (0..bounds.len() as i64).collect()),
        num_col("her_upper_bound", &bounds),
    ])?;

    let mut wb = Workbook::new(COMBINED_SLICES_WORKBOOK);
    wb.add_sheet("aggregate_data", aggregate);
    wb.add_sheet("cells", cells);
    wb.add_sheet("bin_bounds", bin_bounds);
    Ok(wb)
}

pub fn histogram_workbook(slices: &[SliceNoise]) -> Result<Workbook> {
    let cells: Vec<&Cell> = slices.iter().flat_map(|s| s.cells.iter()).collect();
    let df = frame(vec![
        num_col("Her1", &cells.iter().map(|c| c.her1).collect::<Vec<_>>()),
        num_col("Her7", &cells.iter().map(|c| c.her7).collect::<Vec<_>>()),
        num_col("Total Her", &cells.iter().map(|c| c.her1 + c.her7).collect::<Vec<_>>()),
    ])?;
    let mut wb = Workbook::new(HISTOGRAM_WORKBOOK);
    wb.add_sheet("histogram", df);
    Ok(wb)
}

pub fn noise_workbook(slices: &[SliceNoise], edges: &[f64]) -> Result<Workbook> {
    let mut wb = Workbook::new(NOISE_WORKBOOK);
    for axis in NoiseAxis::ALL {
        let bins = bin_noise(slices, axis, edges);
        wb.add_sheet(axis.sheet_name(), noise_sheet(&bins)?);
        wb.add_sheet(&axis.log_sheet_name(), log_sheet(&bins)?);
    }
    wb.add_sheet("Her1 single noise", single_noise_sheet(&bin_single_gene(slices, true, edges))?);
    wb.add_sheet("Her7 single noise", single_noise_sheet(&bin_single_gene(slices, false, edges))?);
    wb.add_sheet("spss_onewayANOVA", one_way_anova_sheet(slices)?);
    wb.add_sheet("spss_bin", spss_bin_sheet(slices, edges)?);
    wb.add_sheet("spss_bin_her1_single", spss_single_bin_sheet(slices, true, edges)?);
    wb.add_sheet("spss_bin_her7_single", spss_single_bin_sheet(slices, false, edges)?);
    Ok(wb)
}

// ─── Plots ──────────────────────────────────────────────────────────────────

const NOISE_NAMES: [&str; 3] = ["Total", "Intrinsic", "Extrinsic"];

fn linear_noise_series(bins: &[NoiseBin]) -> Vec<PlotSeries> {
    let filled: Vec<&NoiseBin> = bins.iter().filter(|b| !b.mean.is_empty()).collect();
    (0..3)
        .map(|k| {
            let points = filled
                .iter()
                .map(|b| {
                    let y = [b.total, b.intrinsic, b.extrinsic][k];
                    ErrorPoint::new(b.mean.mean, y.mean)
                        .x_err(2.0 * b.mean.se)
                        .y_err(2.0 * y.se)
                })
                .collect();
            PlotSeries::new(NOISE_COLOURS[k], points).label(NOISE_NAMES[k]).size(4)
        })
        .collect()
}

fn log_noise_series(bins: &[NoiseBin]) -> Vec<PlotSeries> {
    let rows: Vec<[LogPoint; 4]> = log_rows(bins).into_iter().flatten().collect();
    (0..3)
        .map(|k| {
            let points = rows
                .iter()
                .map(|r| {
                    ErrorPoint::new(r[0].value, r[k + 1].value)
                        .asym_x(r[0].lower, r[0].upper)
                        .asym_y(r[k + 1].lower, r[k + 1].upper)
                })
                .collect();
            PlotSeries::new(NOISE_COLOURS[k], points).label(NOISE_NAMES[k]).size(4)
        })
        .collect()
}

fn log_scatter(xs: &[f64], ys: &[f64]) -> Vec<ErrorPoint> {
    xs.iter()
        .zip(ys)
        .filter(|(x, y)| **x > 0.0 && **y > 0.0)
        .map(|(x, y)| ErrorPoint::new(x.log10(), y.log10()))
        .collect()
}

pub fn plot_noise(slices: &[SliceNoise], config: &Config, out_dir: &Path) -> Result<()> {
    let size = (config.figure.width, config.figure.height);
    let edges = &config.bin_edges;

    for axis in NoiseAxis::ALL {
        let bins = bin_noise(slices, axis, edges);
        let x_label = format!("Mean {} mRNA in grouped slices", axis.label());
        save_figure(&out_dir.join(format!("noise_{}.png", axis.label())), size, (1, 1), |p| {
            draw_chart(&p[0], &Axes::new("", &x_label, "Noise (CV²)"), &linear_noise_series(&bins))
        })?;
        save_figure(&out_dir.join(format!("logNoise_{}.png", axis.label())), size, (1, 1), |p| {
            draw_chart(&p[0], &Axes::new("", &x_label, "Noise").log10(), &log_noise_series(&bins))
        })?;
    }

    for (her1, label) in [(true, "her1"), (false, "her7")] {
        let bins = bin_single_gene(slices, her1, edges);
        let points = bins
            .iter()
            .filter(|(m, _)| !m.is_empty())
            .map(|(m, c)| ErrorPoint::new(m.mean, c.mean).x_err(2.0 * m.se).y_err(2.0 * c.se))
            .collect();
        let series = [PlotSeries::new(NOISE_COLOURS[0], points).label("Total").size(4)];
        let axes = Axes::new(
            "",
            &format!("Mean {} mRNA in grouped slices", label),
            "Noise (coefficient of variation squared)",
        );
        save_figure(&out_dir.join(format!("noise_{}_single.png", label)), size, (1, 1), |p| {
            draw_chart(&p[0], &axes, &series)
        })?;
    }

    let raw: [(&str, Vec<f64>, Vec<f64>); 3] = [
        (
            "her",
            slices.iter().map(|s| s.noise.her_mean()).collect(),
            slices.iter().map(|s| s.noise.total).collect(),
        ),
        (
            "her1",
            slices.iter().map(|s| s.noise.her1_mean).collect(),
            slices.iter().map(|s| s.her1_cv2).collect(),
        ),
        (
            "her7",
            slices.iter().map(|s| s.noise.her7_mean).collect(),
            slices.iter().map(|s| s.her7_cv2).collect(),
        ),
    ];
    for (k, (label, xs, ys)) in raw.iter().enumerate() {
        let series = [PlotSeries::new(NOISE_COLOURS[k], log_scatter(xs, ys))
            .label("Total noise in single slices")
            .size(2)];
        let axes = Axes::new("", &format!("Mean {} mRNA in single slice", label), "Total noise (CV²)").log10();
        save_figure(&out_dir.join(format!("loglogNoise_{}.png", label)), size, (1, 1), |p| {
            draw_chart(&p[0], &axes, &series)
        })?;
    }
    Ok(())
}

/// Noise stage of `combine`: writes `noise/`, `combined_slices/`, `histogram_her/` and the plots.
pub fn run(embryos: &[EmbryoSlices], num_bins: usize, config: &Config, out_dir: &Path) -> Result<()> {
    info!("Computing expression noise for {} embryos", embryos.len());
    let slices = collect_slice_noise(embryos, config.min_cells);
    if slices.is_empty() {
        warn!("No slice has {} or more cells with positive her1 and her7", config.min_cells);
    }
    debug!("{} valid slices", slices.len());

    noise_workbook(&slices, &config.bin_edges)?.save(out_dir)?;
    combined_slices_workbook(&slices, num_bins)?.save(out_dir)?;
    histogram_workbook(&slices)?.save(out_dir)?;
    plot_noise(&slices, config, out_dir)?;
    info!("Noise analysis written to {}", out_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper_functions::{f64_column, string_column};
    use crate::models::{Region, RegionSlices, SliceRow};
    use assert_approx_eq::assert_approx_eq;
    use std::path::PathBuf;

    fn embryo(rows: Vec<Option<Vec<(f64, f64)>>>) -> EmbryoSlices {
        EmbryoSlices {
            source: PathBuf::from("slices.xls"),
            regions: vec![RegionSlices {
                region: Region::Left,
                rows: rows
                    .into_iter()
                    .enumerate()
                    .map(|(position, cells)| SliceRow {
                        position,
                        cells: cells.map(|c| c.into_iter().map(|(a, b)| Cell::new(a, b)).collect()),
                    })
                    .collect(),
            }],
        }
    }

    fn sample() -> Vec<SliceNoise> {
        let e = embryo(vec![
            Some(vec![(10.0, 12.0), (14.0, 10.0), (12.0, 14.0)]),
            Some(vec![(30.0, 30.0), (40.0, 50.0), (50.0, 40.0), (-1.0, 3.0)]),
            None,
            Some(vec![(5.0, 5.0), (6.0, 0.0)]),
            Some(vec![(20.0, 25.0), (25.0, 20.0), (22.0, 22.0)]),
        ]);
        collect_slice_noise(&[e], 3)
    }

    #[test]
    fn invalid_and_sparse_slices_are_skipped() {
        let slices = sample();
        assert_eq!(slices.len(), 3);
        // the negative pair is dropped from the second slice
        assert_eq!(slices[1].cells.len(), 3);
        assert_approx_eq!(slices[1].noise.her1_mean, 40.0);
    }

    #[test]
    fn fixed_bins_summarise_noise() {
        let slices = sample();
        // her means: 24, 80, 44.67
        let bins = bin_noise(&slices, NoiseAxis::Her, &[45.0, 80.0, 100.0]);
        assert_eq!(bins[0].mean.count, 2);
        assert_eq!(bins[1].mean.count, 1);
        assert_eq!(bins[2].mean.count, 0);
        let expected = (slices[0].noise.total + slices[2].noise.total) / 2.0;
        assert_approx_eq!(bins[0].total.mean, expected);
        assert!(bins[2].total.mean.is_nan());

        let df = noise_sheet(&bins).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(f64_column(&df, "total").unwrap()[2], None);

        let log = log_sheet(&bins).unwrap();
        let x = f64_column(&log, "x").unwrap();
        assert!(x[0].is_some());
        // a single-slice bin has no log entry
        assert_eq!(x[1], None);
    }

    #[test]
    fn anova_sheet_splits_at_half_range() {
        let slices = sample();
        let df = one_way_anova_sheet(&slices).unwrap();
        assert_eq!(df.height(), 6);
        // threshold = (80 - 24) / 2 = 28: only the first slice is low
        let groups = string_column(&df, "expression").unwrap();
        assert_eq!(groups[0].as_deref(), Some("low"));
        assert_eq!(groups[1].as_deref(), Some("low"));
        assert_eq!(groups[2].as_deref(), Some("high"));
        assert_eq!(
            f64_column(&df, "noise type").unwrap(),
            vec![Some(1.0), Some(2.0), Some(1.0), Some(2.0), Some(1.0), Some(2.0)]
        );
    }

    #[test]
    fn combined_slices_bounds_end_at_maximum() {
        let slices = sample();
        let wb = combined_slices_workbook(&slices, 4).unwrap();
        let bounds = f64_column(wb.sheet("bin_bounds").unwrap(), "her_upper_bound").unwrap();
        assert_eq!(bounds.len(), 4);
        assert_approx_eq!(bounds[3].unwrap(), 80.0);
        assert_eq!(wb.sheet("cells").unwrap().height(), 9);
        assert_eq!(
            f64_column(wb.sheet("aggregate_data").unwrap(), "num_cells").unwrap(),
            vec![Some(3.0), Some(3.0), Some(3.0)]
        );
    }

    #[test]
    fn single_gene_bins_use_reporter_cv2() {
        let slices = sample();
        let bins = bin_single_gene(&slices, true, &[15.0, 45.0]);
        // her1 means: 12, 40, 22.33
        assert_eq!(bins[0].0.count, 1);
        assert_eq!(bins[1].0.count, 2);
        assert_approx_eq!(bins[0].1.mean, slices[0].her1_cv2);
    }
}
