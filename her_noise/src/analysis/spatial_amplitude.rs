use std::path::Path;

use plotters::prelude::{BLUE, RED};
use plotters::style::RGBColor;
use polars::prelude::*;
use tracing::info;

use crate::analysis::binning::{representative_count, sections};
use crate::analysis::statistics::{mean, population_std, std_error, Summary};
use crate::config::Config;
use crate::data_handling::workbook::Workbook;
use crate::errors::Result;
use crate::helper_functions::{frame, int_col, num_col, str_col};
use crate::models::{EmbryoSlices, Gene, Region};
use crate::plotting::{draw_bars, draw_chart, save_figure, Axes, Bar, ErrorPoint, PlotSeries, DARK_GREEN};

pub const SPATIAL_AMPLITUDE_WORKBOOK: &str = "spatial_amplitude";
pub const COMBINED_EXPRESSION_WORKBOOK: &str = "combined_spatial_expression";

const COLOURS: [RGBColor; 3] = [BLUE, RED, DARK_GREEN];

/// Slice means of one gene indexed `[position][embryo]`, NaN where a slice is missing or invalid.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialProfile {
    pub gene: Gene,
    pub left: Vec<Vec<f64>>,
    pub right: Vec<Vec<f64>>,
    pub num_embryos: usize,
}

impl SpatialProfile {
    pub fn from_embryos(embryos: &[EmbryoSlices], gene: Gene) -> SpatialProfile {
        let positions = embryos
            .iter()
            .flat_map(|e| e.regions.iter().map(|r| r.rows.len()))
            .max()
            .unwrap_or(0);
        let mut left = vec![vec![f64::NAN; embryos.len()]; positions];
        let mut right = vec![vec![f64::NAN; embryos.len()]; positions];

        for (e, embryo) in embryos.iter().enumerate() {
            for region in &embryo.regions {
                let target = match region.region {
                    Region::Left => &mut left,
                    Region::Right => &mut right,
                };
                for row in &region.rows {
                    if let (Some(cells), Some(slot)) = (row.clamped_cells(), target.get_mut(row.position)) {
                        let values: Vec<f64> = cells.iter().map(|c| gene.value(c)).collect();
                        slot[e] = mean(&values);
                    }
                }
            }
        }
        SpatialProfile {
            gene,
            left,
            right,
            num_embryos: embryos.len(),
        }
    }

    /// Finite left and right values at `position`.
    pub fn pooled(&self, position: usize) -> Vec<f64> {
        self.left
            .get(position)
            .into_iter()
            .chain(self.right.get(position))
            .flatten()
            .copied()
            .filter(|v| !v.is_nan())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionAmplitude {
    pub amplitude: f64,
    pub se: f64,
}

/// Difference between the means of the top and bottom `percent` of `values`.
pub fn tail_amplitude(values: &[f64], percent: f64) -> SectionAmplitude {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let bottom_index = (sorted.len() as f64 * percent) as usize;
    let top_index = (sorted.len() as f64 * (1.0 - percent)) as usize;
    let bottom = &sorted[..bottom_index];
    let top = &sorted[top_index..];

    let spread = (population_std(top).powi(2) + population_std(bottom).powi(2)).sqrt();
    SectionAmplitude {
        amplitude: mean(top) - mean(bottom),
        se: spread / ((top.len() + bottom.len()) as f64).sqrt(),
    }
}

pub fn amplitude_across_space(profile: &SpatialProfile, n: usize, config: &Config) -> Vec<SectionAmplitude> {
    sections(n, config.slices_per_section)
        .into_iter()
        .map(|range| {
            let pooled: Vec<f64> = range.flat_map(|p| profile.pooled(p)).collect();
            tail_amplitude(&pooled, config.amplitude_percent)
        })
        .collect()
}

/// Section rows followed by an `Average` row (mean and standard error of the section amplitudes).
pub fn amplitude_sheet(amplitudes: &[SectionAmplitude], section_size: usize) -> Result<DataFrame> {
    let mut group: Vec<String> = Vec::new();
    let mut positions: Vec<String> = Vec::new();
    for i in 0..amplitudes.len() {
        group.push((i + 1).to_string());
        positions.push(format!("{}-{}", i * section_size, (i + 1) * section_size - 1));
    }
    group.push("Average".to_string());
    positions.push(String::new());

    let values: Vec<f64> = amplitudes.iter().map(|a| a.amplitude).collect();
    let mut amplitude = values.clone();
    amplitude.push(mean(&values));
    let mut se: Vec<f64> = amplitudes.iter().map(|a| a.se).collect();
    se.push(std_error(&values));

    frame(vec![
        str_col("Group", group),
        str_col("Positions", positions),
        num_col("Amplitude", &amplitude),
        num_col("Std error", &se),
    ])
}

/// Per position summary of the pooled slice means plus every embryo's left and right value.
pub fn combined_expression_sheet(profile: &SpatialProfile, n: usize) -> Result<DataFrame> {
    let n = n.min(profile.left.len());
    let pooled: Vec<Vec<f64>> = (0..n).map(|p| profile.pooled(p)).collect();
    let stat = |f: &dyn Fn(&[f64]) -> f64| -> Vec<f64> {
        pooled
            .iter()
            .map(|v| if v.is_empty() { f64::NAN } else { f(v) })
            .collect()
    };

    let mut columns = vec![
        int_col("Cell position", (0..n as i64).collect()),
        num_col("Mean", &stat(&|v: &[f64]| mean(v))),
        num_col("Stdev", &stat(&|v: &[f64]| population_std(v))),
        num_col("Min", &stat(&|v: &[f64]| v.iter().copied().fold(f64::INFINITY, f64::min))),
        num_col("Max", &stat(&|v: &[f64]| v.iter().copied().fold(f64::NEG_INFINITY, f64::max))),
    ];
    for (side, values) in [("L", &profile.left), ("R", &profile.right)] {
        for e in 0..profile.num_embryos {
            let column: Vec<f64> = values.iter().take(n).map(|row| row[e]).collect();
            columns.push(num_col(&format!("Embryo {} {}", e + 1, side), &column));
        }
    }
    frame(columns)
}

fn plot_amplitude(profiles: &[SpatialProfile], amplitudes: &[Vec<SectionAmplitude>], config: &Config, out_dir: &Path) -> Result<()> {
    // 1. her1 and her7 averages
    let bars: Vec<Bar> = amplitudes
        .iter()
        .take(2)
        .enumerate()
        .map(|(i, a)| {
            let values: Vec<f64> = a.iter().map(|s| s.amplitude).collect();
            Bar {
                x: i as f64,
                height: mean(&values),
                err: 2.0 * std_error(&values),
                colour: COLOURS[i],
            }
        })
        .collect();
    let ticks = vec![(0.0, "her1".to_string()), (1.0, "her7".to_string())];
    let axes = Axes::new("", "", "Spatial amplitude");
    save_figure(&out_dir.join("average_spatial_amplitude_bar.png"), (config.figure.height / 2, config.figure.height), (1, 1), |p| {
        draw_bars(&p[0], &axes, &bars, 0.4, &ticks, &[])
    })?;

    // 2. amplitude across space
    let section = config.slices_per_section as f64;
    save_figure(&out_dir.join("spatial_amplitude_line.png"), (config.figure.height, config.figure.height * 3 / 2), (3, 1), |panels| {
        for (i, (profile, amps)) in profiles.iter().zip(amplitudes).enumerate() {
            let points = amps
                .iter()
                .enumerate()
                .map(|(j, a)| ErrorPoint::new(j as f64 * section + section / 2.0, a.amplitude).y_err(2.0 * a.se))
                .collect();
            let axes = Axes::new("", "Cell position (posterior - anterior)", &format!("{} amplitude", profile.gene));
            draw_chart(&panels[i], &axes, &[PlotSeries::new(COLOURS[i], points).line()])?;
        }
        Ok(())
    })
}

fn plot_combined_expression(profiles: &[SpatialProfile], n: usize, config: &Config, out_dir: &Path) -> Result<()> {
    let size = (config.figure.width, config.figure.width);
    save_figure(&out_dir.join("combined_spatial_expression.png"), size, (3, 2), |panels| {
        for (i, profile) in profiles.iter().enumerate() {
            let x_range = -2.0..(n as f64 + 1.0);
            let axes = Axes::new("", "Cell position (posterior - anterior)", &format!("{} mRNA", profile.gene))
                .x_range(x_range);

            let scatter: Vec<ErrorPoint> = (0..n)
                .flat_map(|p| profile.pooled(p).into_iter().map(move |v| ErrorPoint::new(p as f64, v)))
                .collect();
            draw_chart(&panels[2 * i], &axes, &[PlotSeries::new(COLOURS[i], scatter).size(2)])?;

            let summary: Vec<ErrorPoint> = (0..n)
                .filter_map(|p| {
                    let s = Summary::of(&profile.pooled(p));
                    (!s.is_empty()).then(|| ErrorPoint::new(p as f64, s.mean).y_err(2.0 * s.se))
                })
                .collect();
            draw_chart(&panels[2 * i + 1], &axes, &[PlotSeries::new(COLOURS[i], summary).size(2)])?;
        }
        Ok(())
    })
}

pub fn run(embryos: &[EmbryoSlices], config: &Config, out_dir: &Path) -> Result<()> {
    info!("Measuring spatial amplitude of {} embryos", embryos.len());
    let row_counts: Vec<usize> = embryos
        .iter()
        .flat_map(|e| e.regions.iter().map(|r| r.rows.len()))
        .collect();
    let n = representative_count(&row_counts, embryos.len(), config.representative_fraction);

    let profiles: Vec<SpatialProfile> = Gene::ALL
        .iter()
        .map(|&g| SpatialProfile::from_embryos(embryos, g))
        .collect();
    let amplitudes: Vec<Vec<SectionAmplitude>> = profiles
        .iter()
        .map(|p| amplitude_across_space(p, n, config))
        .collect();

    let mut amplitude_wb = Workbook::new(SPATIAL_AMPLITUDE_WORKBOOK);
    let mut combined_wb = Workbook::new(COMBINED_EXPRESSION_WORKBOOK);
    for (profile, amps) in profiles.iter().zip(&amplitudes) {
        amplitude_wb.add_sheet(profile.gene.sheet_name(), amplitude_sheet(amps, config.slices_per_section)?);
        combined_wb.add_sheet(profile.gene.sheet_name(), combined_expression_sheet(profile, n)?);
    }
    amplitude_wb.save(out_dir)?;
    combined_wb.save(out_dir)?;

    plot_amplitude(&profiles, &amplitudes, config, out_dir)?;
    plot_combined_expression(&profiles, n, config, out_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper_functions::{f64_column, string_column};
    use crate::models::{Cell, RegionSlices, SliceRow};
    use assert_approx_eq::assert_approx_eq;
    use std::path::PathBuf;

    fn region(region: Region, values: &[Option<f64>]) -> RegionSlices {
        RegionSlices {
            region,
            rows: values
                .iter()
                .enumerate()
                .map(|(position, v)| SliceRow {
                    position,
                    cells: v.map(|v| vec![Cell::new(v, -1.0), Cell::new(v, 3.0)]),
                })
                .collect(),
        }
    }

    #[test]
    fn profile_clamps_and_keeps_embryo_columns() {
        let embryos = vec![
            EmbryoSlices {
                source: PathBuf::new(),
                regions: vec![
                    region(Region::Left, &[Some(2.0), None]),
                    region(Region::Right, &[Some(4.0), Some(6.0)]),
                ],
            },
            EmbryoSlices {
                source: PathBuf::new(),
                regions: vec![region(Region::Left, &[Some(8.0)])],
            },
        ];
        let her7 = SpatialProfile::from_embryos(&embryos, Gene::Her7);
        // -1 is clamped: mean(0, 3)
        assert_approx_eq!(her7.left[0][0], 1.5);
        let her = SpatialProfile::from_embryos(&embryos, Gene::Her);
        assert_approx_eq!(her.left[0][1], 9.5);
        assert!(her.left[1][0].is_nan());
        assert!(her.left[1][1].is_nan());
        assert_eq!(her.pooled(0).len(), 3);
        assert_eq!(her.pooled(1), vec![7.5]);
    }

    #[test]
    fn tail_amplitude_uses_top_and_bottom_tenth() {
        let values: Vec<f64> = (1..=20).map(f64::from).collect();
        let a = tail_amplitude(&values, 0.1);
        // bottom 1, 2 and top 19, 20
        assert_approx_eq!(a.amplitude, 18.0);
        assert_approx_eq!(a.se, (0.25f64 + 0.25).sqrt() / 2.0);
    }

    #[test]
    fn amplitude_sheet_ends_with_average() {
        let amps = [
            SectionAmplitude { amplitude: 10.0, se: 1.0 },
            SectionAmplitude { amplitude: 20.0, se: 2.0 },
        ];
        let df = amplitude_sheet(&amps, 5).unwrap();
        assert_eq!(df.height(), 3);
        let positions = string_column(&df, "Positions").unwrap();
        assert_eq!(positions[1].as_deref(), Some("5-9"));
        let amplitude = f64_column(&df, "Amplitude").unwrap();
        assert_eq!(amplitude[2], Some(15.0));
        let se = f64_column(&df, "Std error").unwrap();
        assert_approx_eq!(se[2].unwrap(), 5.0 / 2f64.sqrt());
    }

    #[test]
    fn combined_sheet_has_embryo_columns() {
        let embryos = vec![EmbryoSlices {
            source: PathBuf::new(),
            regions: vec![
                region(Region::Left, &[Some(2.0), None]),
                region(Region::Right, &[Some(4.0), Some(6.0)]),
            ],
        }];
        let profile = SpatialProfile::from_embryos(&embryos, Gene::Her1);
        let df = combined_expression_sheet(&profile, 2).unwrap();
        assert_eq!(df.width(), 7);
        assert_eq!(f64_column(&df, "Mean").unwrap(), vec![Some(3.0), Some(6.0)]);
        assert_eq!(f64_column(&df, "Embryo 1 L").unwrap(), vec![Some(2.0), None]);
    }
}
