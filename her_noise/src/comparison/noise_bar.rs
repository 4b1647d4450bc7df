use std::path::Path;

use plotters::style::RGBColor;
use polars::prelude::*;
use tracing::info;

use crate::analysis::raw_noise::{COMBINED_SHEET, RAW_NOISE_WORKBOOK};
use crate::analysis::statistics::{mean, Summary};
use crate::comparison::{group_centre, grouped_x, legend, load_all, Loaded};
use crate::config::Config;
use crate::data_handling::workbook::Workbook;
use crate::errors::Result;
use crate::helper_functions::{f64_column, frame, num_col, str_col};
use crate::models::Background;
use crate::plotting::{draw_bars, save_figure, Axes, Bar};

pub const COMPARE_NOISE_BAR_WORKBOOK: &str = "compare_noise_bar";

const COLUMNS: [&str; 3] = ["Total noise", "Intrinsic noise", "Extrinsic noise"];
const LABELS: [&str; 3] = ["Total", "Intrinsic", "Extrinsic"];

/// Total, intrinsic and extrinsic noise of every valid slice of one background.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseValues {
    pub values: [Vec<f64>; 3],
}

impl NoiseValues {
    pub fn read(combined: &DataFrame) -> Result<Self> {
        let mut values: [Vec<f64>; 3] = Default::default();
        for (k, column) in COLUMNS.iter().enumerate() {
            values[k] = f64_column(combined, column)?.into_iter().flatten().collect();
        }
        Ok(NoiseValues { values })
    }

    pub fn means(&self) -> [f64; 3] {
        [mean(&self.values[0]), mean(&self.values[1]), mean(&self.values[2])]
    }

    /// Every value divided by the matching entry of `reference`.
    pub fn normalized(&self, reference: [f64; 3]) -> NoiseValues {
        let mut values = self.values.clone();
        for (v, r) in values.iter_mut().zip(reference) {
            v.iter_mut().for_each(|x| *x /= r);
        }
        NoiseValues { values }
    }

    pub fn summaries(&self) -> [Summary; 3] {
        [
            Summary::of(&self.values[0]),
            Summary::of(&self.values[1]),
            Summary::of(&self.values[2]),
        ]
    }
}

/// Raw values of every background and the same values normalised by the first background's means.
pub fn read_noise(loaded: &[Loaded]) -> Result<(Vec<NoiseValues>, Vec<NoiseValues>)> {
    let raw = loaded
        .iter()
        .map(|l| NoiseValues::read(l.workbook.sheet(COMBINED_SHEET)?))
        .collect::<Result<Vec<_>>>()?;
    let reference = raw.first().map_or([f64::NAN; 3], NoiseValues::means);
    let normalized = raw.iter().map(|r| r.normalized(reference)).collect();
    Ok((raw, normalized))
}

/// One row per slice: background, raw intrinsic/extrinsic/total, normalised intrinsic/extrinsic/total.
pub fn spss_sheet(names: &[String], raw: &[NoiseValues], normalized: &[NoiseValues]) -> Result<DataFrame> {
    let mut background = Vec::new();
    let mut columns: [Vec<f64>; 6] = Default::default();
    for ((name, r), n) in names.iter().zip(raw).zip(normalized) {
        for i in 0..r.values[0].len() {
            background.push(name.clone());
            for (k, src) in [1, 2, 0].iter().enumerate() {
                columns[k].push(r.values[*src].get(i).copied().unwrap_or(f64::NAN));
                columns[k + 3].push(n.values[*src].get(i).copied().unwrap_or(f64::NAN));
            }
        }
    }
    let headers = [
        "raw_in_noise",
        "raw_ex_noise",
        "raw_tot_noise",
        "normalized_in_noise",
        "normalized_ex_noise",
        "normalized_tot_noise",
    ];
    let mut out = vec![str_col("Genetic background", background)];
    out.extend(headers.iter().zip(&columns).map(|(h, v)| num_col(h, v)));
    frame(out)
}

/// Per background mean and 2·se of total, intrinsic and extrinsic noise.
pub fn summary_sheet(names: &[String], values: &[NoiseValues]) -> Result<DataFrame> {
    let summaries: Vec<[Summary; 3]> = values.iter().map(NoiseValues::summaries).collect();
    let mut columns = vec![str_col("Genetic background", names.to_vec())];
    for (k, kind) in ["total", "intrinsic", "extrinsic"].iter().enumerate() {
        let m: Vec<f64> = summaries.iter().map(|s| s[k].mean).collect();
        let e: Vec<f64> = summaries.iter().map(|s| 2.0 * s[k].se).collect();
        columns.push(num_col(&format!("{} mean", kind), &m));
        columns.push(num_col(&format!("{} 2se", kind), &e));
    }
    frame(columns)
}

/// Bars grouped by noise type: total, then intrinsic, then extrinsic.
pub fn noise_bars(colours: &[RGBColor], values: &[NoiseValues]) -> Vec<Bar> {
    let n = values.len();
    let mut bars = Vec::new();
    for (j, (v, colour)) in values.iter().zip(colours).enumerate() {
        for (k, s) in v.summaries().iter().enumerate() {
            bars.push(Bar {
                x: grouped_x(k, j, n),
                height: s.mean,
                err: 2.0 * s.se,
                colour: *colour,
            });
        }
    }
    bars
}

pub fn noise_ticks(n: usize) -> Vec<(f64, String)> {
    LABELS
        .iter()
        .enumerate()
        .map(|(k, l)| (group_centre(k, n), l.to_string()))
        .collect()
}

pub fn run(backgrounds: &[Background], config: &Config, out_dir: &Path) -> Result<()> {
    info!("Comparing noise levels of {} backgrounds", backgrounds.len());
    let loaded = load_all(backgrounds, RAW_NOISE_WORKBOOK)?;
    let (raw, normalized) = read_noise(&loaded)?;
    let names: Vec<String> = loaded.iter().map(|l| l.name.clone()).collect();

    let mut wb = Workbook::new(COMPARE_NOISE_BAR_WORKBOOK);
    wb.add_sheet("spss", spss_sheet(&names, &raw, &normalized)?);
    wb.add_sheet("Raw_data", summary_sheet(&names, &raw)?);
    wb.add_sheet("Normalized_data", summary_sheet(&names, &normalized)?);
    wb.save(out_dir)?;

    let colours: Vec<RGBColor> = loaded.iter().map(|l| l.colour).collect();
    let ticks = noise_ticks(loaded.len());
    let size = (config.figure.width, config.figure.height);
    for (values, file, y_label) in [
        (&raw, "compare_raw_noise_bar.png", "Noise"),
        (&normalized, "compare_nor_noise_bar.png", "Normalized Noise"),
    ] {
        let bars = noise_bars(&colours, values);
        let axes = Axes::new("", "", y_label);
        save_figure(&out_dir.join(file), size, (1, 1), |p| {
            draw_bars(&p[0], &axes, &bars, 0.8, &ticks, &legend(&loaded))
        })?;
    }
    Ok(())
}
