use std::path::Path;

use polars::prelude::*;
use tracing::{info, warn};

use crate::analysis::binning::{interval_bin, positional_regions, representative_count, tercile_group, tercile_thresholds};
use crate::analysis::statistics::{cv_squared, mean, Summary};
use crate::config::Config;
use crate::data_handling::workbook::Workbook;
use crate::errors::Result;
use crate::helper_functions::{frame, int_col, num_col};
use crate::models::{EmbryoSlices, Gene};
use crate::plotting::{draw_chart, save_figure, Axes, ErrorPoint, PlotSeries, SKY_BLUE, MAGENTA, TEAL, VIOLET};

pub const CV_SQUARED_WORKBOOK: &str = "CVsquared";
pub const GROUP_NAMES: [&str; 3] = ["low", "medium", "high"];
const GROUP_COLOURS: [plotters::style::RGBColor; 3] = [SKY_BLUE, MAGENTA, TEAL];

/// Slice means and CV² of every embryo and region that has a valid slice at one cell position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionCv {
    pub means: Vec<f64>,
    pub cv2: Vec<f64>,
}

impl PositionCv {
    fn push(&mut self, m: f64, c: f64) {
        self.means.push(m);
        self.cv2.push(c);
    }

    pub fn len(&self) -> usize {
        self.means.len()
    }

    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneCv {
    pub gene: Gene,
    pub positions: Vec<PositionCv>,
}

impl GeneCv {
    pub fn all_means(&self) -> Vec<f64> {
        self.positions.iter().flat_map(|p| p.means.iter().copied()).collect()
    }

    /// Splits the first `n` positions into low/medium/high expression using terciles of all means.
    pub fn grouped(&self, n: usize) -> Vec<[PositionCv; 3]> {
        let thresholds = tercile_thresholds(&self.all_means());
        self.positions
            .iter()
            .take(n)
            .map(|p| {
                let mut groups: [PositionCv; 3] = Default::default();
                if let Some(t) = &thresholds {
                    for (m, c) in p.means.iter().zip(&p.cv2) {
                        if let Some(g) = tercile_group(*m, t) {
                            groups[g].push(*m, *c);
                        }
                    }
                }
                groups
            })
            .collect()
    }
}

/// Per-position CV² of her1, her7 and her across embryos, plus the representative number of positions.
pub fn collect_position_cv(embryos: &[EmbryoSlices], config: &Config) -> (Vec<GeneCv>, usize) {
    let mut genes: Vec<GeneCv> = Gene::ALL
        .iter()
        .map(|&gene| GeneCv {
            gene,
            positions: Vec::new(),
        })
        .collect();
    let mut row_counts = Vec::new();

    for embryo in embryos {
        for region in &embryo.regions {
            row_counts.push(region.rows.len());
            for row in &region.rows {
                for g in genes.iter_mut() {
                    if g.positions.len() <= row.position {
                        g.positions.resize(row.position + 1, PositionCv::default());
                    }
                }
                let cells = row.positive_cells();
                if !row.is_valid() || cells.len() < config.min_cells.max(1) {
                    continue;
                }
                for g in genes.iter_mut() {
                    let values: Vec<f64> = cells.iter().map(|c| g.gene.value(c)).collect();
                    g.positions[row.position].push(mean(&values), cv_squared(&values));
                }
            }
        }
    }

    let n = representative_count(&row_counts, embryos.len(), config.representative_fraction);
    (genes, n)
}

fn group_columns(groups: &[[PositionCv; 3]], k: usize) -> Vec<Column> {
    let name = GROUP_NAMES[k];
    let summaries: Vec<(Summary, Summary)> = groups
        .iter()
        .map(|g| (Summary::of(&g[k].means), Summary::of(&g[k].cv2)))
        .collect();
    vec![
        num_col(&format!("{} mean", name), &summaries.iter().map(|s| s.0.mean).collect::<Vec<_>>()),
        num_col(&format!("{} mean se", name), &summaries.iter().map(|s| s.0.se).collect::<Vec<_>>()),
        num_col(&format!("{} CV2", name), &summaries.iter().map(|s| s.1.mean).collect::<Vec<_>>()),
        num_col(&format!("{} CV2 se", name), &summaries.iter().map(|s| s.1.se).collect::<Vec<_>>()),
        int_col(&format!("{} count", name), summaries.iter().map(|s| s.0.count as i64).collect()),
    ]
}

pub fn gene_sheet(gene: &GeneCv, n: usize) -> Result<DataFrame> {
    let positions: Vec<&PositionCv> = gene.positions.iter().take(n).collect();
    let groups = gene.grouped(n);
    let cv2: Vec<Summary> = positions.iter().map(|p| Summary::of(&p.cv2)).collect();

    let mut columns = vec![
        int_col("Cell position", (0..positions.len() as i64).collect()),
        num_col("Mean", &positions.iter().map(|p| mean(&p.means)).collect::<Vec<_>>()),
        num_col("CV2", &cv2.iter().map(|s| s.mean).collect::<Vec<_>>()),
        num_col("Std error", &cv2.iter().map(|s| s.se).collect::<Vec<_>>()),
        int_col("# slices", positions.iter().map(|p| p.len() as i64).collect()),
    ];
    for k in 0..3 {
        columns.extend(group_columns(&groups, k));
    }
    frame(columns)
}

/// One (slice_index, cv2) row per slice in expression group `k`.
pub fn group_raw_sheet(groups: &[[PositionCv; 3]], k: usize) -> Result<DataFrame> {
    let mut index = Vec::new();
    let mut cv2 = Vec::new();
    for (i, g) in groups.iter().enumerate() {
        for c in &g[k].cv2 {
            index.push(i as i64);
            cv2.push(*c);
        }
    }
    frame(vec![int_col("slice_index", index), num_col("cv2", &cv2)])
}

/// Her slices of the first `n` positions binned by mean (bins of `interval` up to `max`),
/// per positional region (0 posterior, 1 middle, 2 anterior).
pub fn binned_by_region(gene: &GeneCv, n: usize, interval: f64, max: f64) -> Vec<[PositionCv; 3]> {
    let bins = (max / interval).floor() as usize;
    let mut binned: Vec<[PositionCv; 3]> = vec![Default::default(); bins];
    let regions = positional_regions(n, 3);
    for (i, p) in gene.positions.iter().take(n).enumerate() {
        for (m, c) in p.means.iter().zip(&p.cv2) {
            if let Some(b) = interval_bin(*m, interval, max) {
                binned[b][regions[i]].push(*m, *c);
            }
        }
    }
    binned
}

/// Summary rows (bin, region, mean her, mean CV², se her, se CV²) of the posterior and anterior regions.
pub fn binned_summary(binned: &[[PositionCv; 3]]) -> Vec<(usize, usize, Summary, Summary)> {
    let mut rows = Vec::new();
    for (b, regions) in binned.iter().enumerate() {
        for r in [0, 2] {
            if !regions[r].is_empty() {
                rows.push((b, r, Summary::of(&regions[r].means), Summary::of(&regions[r].cv2)));
            }
        }
    }
    rows
}

pub fn binned_spss_sheet(binned: &[[PositionCv; 3]]) -> Result<DataFrame> {
    let (mut bin, mut region, mut cv2, mut means) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    for (b, regions) in binned.iter().enumerate() {
        for r in [0, 2] {
            for (m, c) in regions[r].means.iter().zip(&regions[r].cv2) {
                bin.push(b as i64);
                region.push(r as i64);
                cv2.push(*c);
                means.push(*m);
            }
        }
    }
    frame(vec![
        int_col("bin_index", bin),
        int_col("Pos=0/Ant=2", region),
        num_col("cv2", &cv2),
        num_col("mean", &means),
    ])
}

pub fn binned_summary_sheet(rows: &[(usize, usize, Summary, Summary)]) -> Result<DataFrame> {
    frame(vec![
        int_col("bin_index", rows.iter().map(|r| r.0 as i64).collect()),
        int_col("Pos=0/Ant=2", rows.iter().map(|r| r.1 as i64).collect()),
        num_col("mean_her", &rows.iter().map(|r| r.2.mean).collect::<Vec<_>>()),
        num_col("mean_cv2", &rows.iter().map(|r| r.3.mean).collect::<Vec<_>>()),
        num_col("her_ste", &rows.iter().map(|r| r.2.se).collect::<Vec<_>>()),
        num_col("cv2_ste", &rows.iter().map(|r| r.3.se).collect::<Vec<_>>()),
    ])
}

/// Every slice's CV² over all positions, region 1 for the posterior half, else 2.
pub fn anova_sheet(gene: &GeneCv) -> Result<DataFrame> {
    let half = gene.positions.len() as f64 / 2.0;
    let mut region = Vec::new();
    let mut cv2 = Vec::new();
    for (i, p) in gene.positions.iter().enumerate() {
        for c in &p.cv2 {
            region.push(if (i as f64) < half { 1 } else { 2 });
            cv2.push(*c);
        }
    }
    frame(vec![int_col("Region", region), num_col("CV2", &cv2)])
}

pub fn cv_squared_workbook(genes: &[GeneCv], n: usize, config: &Config) -> Result<Workbook> {
    let mut wb = Workbook::new(CV_SQUARED_WORKBOOK);
    for gene in genes {
        wb.add_sheet(gene.gene.sheet_name(), gene_sheet(gene, n)?);
    }
    if let Some(her) = genes.iter().find(|g| g.gene == Gene::Her) {
        let groups = her.grouped(n);
        for (k, name) in GROUP_NAMES.iter().enumerate() {
            wb.add_sheet(&format!("her_{}", name), group_raw_sheet(&groups, k)?);
        }
        let binned = binned_by_region(her, n, config.heatmap_interval, config.heatmap_max);
        wb.add_sheet("binned_cv2_her_pos_spss", binned_spss_sheet(&binned)?);
        wb.add_sheet("binned_cv2_her_pos_summary", binned_summary_sheet(&binned_summary(&binned))?);
    }
    for gene in genes {
        wb.add_sheet(&format!("spss_ANOVA_{}", gene.gene.label()), anova_sheet(gene)?);
    }
    Ok(wb)
}

// ─── Plots ──────────────────────────────────────────────────────────────────

fn position_axes(gene: Gene, n: usize) -> Axes {
    Axes::new("", "Cell position (posterior - anterior)", &format!("CV² ({})", gene.label()))
        .x_range(-1.0..n as f64)
}

pub fn plot_cv_squared(genes: &[GeneCv], n: usize, config: &Config, out_dir: &Path) -> Result<()> {
    let size = (config.figure.height, config.figure.height);
    for gene in genes {
        if gene.gene == Gene::Her {
            let groups = gene.grouped(n);
            let series: Vec<PlotSeries> = (0..3)
                .map(|k| {
                    let points = groups
                        .iter()
                        .enumerate()
                        .filter(|(_, g)| !g[k].is_empty())
                        .map(|(i, g)| {
                            let s = Summary::of(&g[k].cv2);
                            ErrorPoint::new(i as f64, s.mean).y_err(2.0 * s.se)
                        })
                        .collect();
                    PlotSeries::new(GROUP_COLOURS[k], points)
                        .label(&format!("{} expression", GROUP_NAMES[k]))
                        .size(4)
                })
                .collect();
            save_figure(&out_dir.join("CVsquared_grouped_her.png"), size, (1, 1), |p| {
                draw_chart(&p[0], &position_axes(gene.gene, n), &series)
            })?;
        } else {
            let points = gene
                .positions
                .iter()
                .take(n)
                .enumerate()
                .filter(|(_, p)| !p.is_empty())
                .map(|(i, p)| {
                    let s = Summary::of(&p.cv2);
                    ErrorPoint::new(i as f64, s.mean).y_err(2.0 * s.se)
                })
                .collect();
            let series = [PlotSeries::new(VIOLET, points).size(4)];
            save_figure(&out_dir.join(format!("CVsquared_{}.png", gene.gene.label())), size, (1, 1), |p| {
                draw_chart(&p[0], &position_axes(gene.gene, n), &series)
            })?;
        }
    }

    if let Some(her) = genes.iter().find(|g| g.gene == Gene::Her) {
        let binned = binned_by_region(her, n, config.heatmap_interval, config.heatmap_max);
        let rows = binned_summary(&binned);
        let series: Vec<PlotSeries> = [(0usize, "Posterior"), (2, "Anterior")]
            .iter()
            .map(|&(r, label)| {
                let points = rows
                    .iter()
                    .filter(|row| row.1 == r)
                    .map(|row| {
                        ErrorPoint::new(row.2.mean, row.3.mean)
                            .x_err(2.0 * row.2.se)
                            .y_err(2.0 * row.3.se)
                    })
                    .collect();
                PlotSeries::new(GROUP_COLOURS[r], points).label(label).size(4)
            })
            .collect();
        let axes = Axes::new("", "Total her mRNA", "CV²").x_range(0.0..config.heatmap_max + 5.0);
        save_figure(&out_dir.join("binned_cv_her_heatmap.png"), (config.figure.width, config.figure.height), (1, 1), |p| {
            draw_chart(&p[0], &axes, &series)
        })?;
    }
    Ok(())
}

pub fn run(embryos: &[EmbryoSlices], config: &Config, out_dir: &Path) -> Result<()> {
    info!("Computing positional CV² for {} embryos", embryos.len());
    let (genes, n) = collect_position_cv(embryos, config);
    if n == 0 {
        warn!("No slices found; CV² tables will be empty");
    }
    info!("Using {} cell positions", n);
    cv_squared_workbook(&genes, n, config)?.save(out_dir)?;
    plot_cv_squared(&genes, n, config, out_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper_functions::f64_column;
    use crate::models::{Cell, Region, RegionSlices, SliceRow};
    use assert_approx_eq::assert_approx_eq;
    use std::path::PathBuf;

    /// Slice `i` has three cells around level `levels[i]`.
    fn embryo(levels: &[Option<f64>]) -> EmbryoSlices {
        let rows = levels
            .iter()
            .enumerate()
            .map(|(position, level)| SliceRow {
                position,
                cells: level.map(|l| {
                    vec![
                        Cell::new(l, 2.0 * l),
                        Cell::new(l + 1.0, 2.0 * l),
                        Cell::new(l + 2.0, 2.0 * l + 3.0),
                    ]
                }),
            })
            .collect();
        EmbryoSlices {
            source: PathBuf::new(),
            regions: vec![RegionSlices {
                region: Region::Left,
                rows,
            }],
        }
    }

    #[test]
    fn collects_valid_positions_across_embryos() {
        let embryos = vec![
            embryo(&[Some(10.0), None, Some(30.0), Some(40.0)]),
            embryo(&[Some(12.0), Some(22.0), Some(32.0)]),
        ];
        let config = Config::default();
        let (genes, n) = collect_position_cv(&embryos, &config);
        // row counts 4 and 3, int(2 * 0.2) = 0
        assert_eq!(n, 3);
        let her1 = &genes[0];
        assert_eq!(her1.positions.len(), 4);
        assert_eq!(her1.positions[0].len(), 2);
        assert_eq!(her1.positions[1].len(), 1);
        assert_approx_eq!(her1.positions[0].means[0], 11.0);
        let her = &genes[2];
        // her per cell: 30, 31, 35
        assert_approx_eq!(her.positions[0].means[0], 32.0);
    }

    #[test]
    fn gene_sheet_has_group_columns() {
        let embryos = vec![
            embryo(&[Some(10.0), Some(20.0), Some(30.0)]),
            embryo(&[Some(15.0), Some(25.0), Some(35.0)]),
        ];
        let config = Config::default();
        let (genes, n) = collect_position_cv(&embryos, &config);
        let df = gene_sheet(&genes[0], n).unwrap();
        assert_eq!(df.height(), 3);
        let total: f64 = ["low count", "medium count", "high count"]
            .iter()
            .map(|c| f64_column(&df, c).unwrap().into_iter().flatten().sum::<f64>())
            .sum();
        assert_eq!(total, 6.0);
        assert_eq!(f64_column(&df, "# slices").unwrap(), vec![Some(2.0); 3]);
    }

    #[test]
    fn heatmap_keeps_posterior_and_anterior() {
        let gene = GeneCv {
            gene: Gene::Her,
            positions: vec![
                PositionCv { means: vec![10.0], cv2: vec![0.1] },
                PositionCv { means: vec![20.0], cv2: vec![0.2] },
                PositionCv { means: vec![50.0, 130.0], cv2: vec![0.3, 0.9] },
            ],
        };
        let binned = binned_by_region(&gene, 3, 15.0, 120.0);
        assert_eq!(binned.len(), 8);
        // regions for 3 positions: 0, 1, 2
        assert_eq!(binned[0][0].means, vec![10.0]);
        assert_eq!(binned[1][1].means, vec![20.0]);
        assert_eq!(binned[3][2].means, vec![50.0]);
        let rows = binned_summary(&binned);
        assert_eq!(rows.len(), 2);
        assert_eq!(binned_spss_sheet(&binned).unwrap().height(), 2);
    }

    #[test]
    fn anova_regions_split_at_half() {
        let gene = GeneCv {
            gene: Gene::Her1,
            positions: vec![
                PositionCv { means: vec![1.0, 1.0], cv2: vec![0.1, 0.2] },
                PositionCv::default(),
                PositionCv { means: vec![1.0], cv2: vec![0.3] },
            ],
        };
        let df = anova_sheet(&gene).unwrap();
        assert_eq!(
            f64_column(&df, "Region").unwrap(),
            vec![Some(1.0), Some(1.0), Some(2.0)]
        );
    }
}
