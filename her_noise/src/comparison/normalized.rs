use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::analysis::raw_noise::RAW_NOISE_WORKBOOK;
use crate::analysis::spatial_amplitude::SPATIAL_AMPLITUDE_WORKBOOK;
use crate::analysis::statistics::Summary;
use crate::comparison::noise_bar::{self, NoiseValues};
use crate::comparison::spatial_amplitude::read_amplitudes;
use crate::comparison::{legend, load_all, Loaded};
use crate::config::Config;
use crate::data_handling::workbook::Workbook;
use crate::errors::{NoiseError, Result};
use crate::helper_functions::{frame, num_col, str_col};
use crate::models::{Background, Gene};
use crate::plotting::{draw_bars, save_figure, Axes, Bar};

pub const NORMALIZED_NOISE_WORKBOOK: &str = "normalized_noise_backgrounds";
pub const NORMALIZED_AMPLITUDE_WORKBOOK: &str = "normalized_herAmp_backgrounds";

/// Splits `items` into consecutive groups of the given sizes.
pub fn partition<'a, T>(items: &'a [T], sizes: &[usize]) -> Result<Vec<&'a [T]>> {
    if sizes.iter().sum::<usize>() != items.len() {
        return Err(NoiseError::InvalidInput(format!(
            "group sizes {:?} do not add up to {} backgrounds",
            sizes,
            items.len()
        )));
    }
    let mut groups = Vec::with_capacity(sizes.len());
    let mut start = 0;
    for &size in sizes {
        groups.push(&items[start..start + size]);
        start += size;
    }
    Ok(groups)
}

fn group_label(group: &[Loaded]) -> String {
    group.iter().map(|l| l.name.as_str()).collect::<Vec<_>>().join("_")
}

fn group_names(group: &[Loaded]) -> Vec<String> {
    group.iter().map(|l| l.name.clone()).collect()
}

/// Bars of each background's mean relative to the first background's, with its error unscaled.
/// Inputs already normalised to the group's first background give that bar a height of 1.
pub fn relative_bars(group: &[Loaded], heights: &[f64], errs: &[f64]) -> Vec<Bar> {
    let reference = heights.first().copied().unwrap_or(f64::NAN);
    group
        .iter()
        .zip(heights.iter().zip(errs))
        .enumerate()
        .map(|(i, (l, (h, e)))| Bar {
            x: i as f64,
            height: h / reference,
            err: *e,
            colour: l.colour,
        })
        .collect()
}

// ─── Noise ──────────────────────────────────────────────────────────────────

/// Per background mean and 2·se of normalised intrinsic, extrinsic and total noise.
pub fn noise_summary_sheet(names: &[String], normalized: &[NoiseValues]) -> Result<DataFrame> {
    let summaries: Vec<[Summary; 3]> = normalized.iter().map(NoiseValues::summaries).collect();
    // summaries are ordered total, intrinsic, extrinsic
    let order = [(1, "in"), (2, "ex"), (0, "tot")];
    let mut columns = vec![str_col("Genetic background", names.to_vec())];
    for (k, short) in order {
        let m: Vec<f64> = summaries.iter().map(|s| s[k].mean).collect();
        columns.push(num_col(&format!("normalized_{}_noise_avg", short), &m));
    }
    for (k, short) in order {
        let e: Vec<f64> = summaries.iter().map(|s| 2.0 * s[k].se).collect();
        columns.push(num_col(&format!("nor_{}_noise_err", short), &e));
    }
    frame(columns)
}

// ─── Amplitude ──────────────────────────────────────────────────────────────

/// Section amplitudes of total her in a group divided by the first background's average amplitude.
pub fn normalized_amplitudes(group: &[Loaded]) -> Result<Vec<(Vec<f64>, Vec<f64>)>> {
    let summaries = group
        .iter()
        .map(|l| read_amplitudes(l.workbook.sheet(Gene::Her.sheet_name())?))
        .collect::<Result<Vec<_>>>()?;
    let reference = summaries.first().map_or(f64::NAN, |s| s.mean);
    Ok(summaries
        .into_iter()
        .map(|s| {
            let normalized = s.sections.iter().map(|a| a / reference).collect();
            (s.sections, normalized)
        })
        .collect())
}

pub fn amplitude_spss_sheet(names: &[String], amplitudes: &[(Vec<f64>, Vec<f64>)]) -> Result<DataFrame> {
    let mut background = Vec::new();
    let (mut raw, mut normalized) = (Vec::new(), Vec::new());
    for (name, (r, n)) in names.iter().zip(amplitudes) {
        background.extend(std::iter::repeat(name.clone()).take(r.len()));
        raw.extend_from_slice(r);
        normalized.extend_from_slice(n);
    }
    frame(vec![
        str_col("Genetic background", background),
        num_col("amplitude", &raw),
        num_col("normalized_amp", &normalized),
    ])
}

pub fn amplitude_summary_sheet(names: &[String], amplitudes: &[(Vec<f64>, Vec<f64>)]) -> Result<DataFrame> {
    let summaries: Vec<Summary> = amplitudes.iter().map(|(_, n)| Summary::of(n)).collect();
    frame(vec![
        str_col("Genetic background", names.to_vec()),
        num_col("average_normalized_amplitude", &summaries.iter().map(|s| s.mean).collect::<Vec<_>>()),
        num_col("std_error_amplitude", &summaries.iter().map(|s| s.se).collect::<Vec<_>>()),
    ])
}

// ─── Stage ──────────────────────────────────────────────────────────────────

fn plot_groups(path: &Path, config: &Config, y_label: &str, groups: &[(&[Loaded], Vec<Bar>)], all: &[Loaded]) -> Result<()> {
    let size = (config.figure.width, config.figure.height);
    save_figure(path, size, (1, groups.len().max(1)), |panels| {
        for (k, (panel, (group, bars))) in panels.iter().zip(groups).enumerate() {
            // a single legend for the whole figure
            let labels = if k == 0 { legend(all) } else { Vec::new() };
            let ticks: Vec<(f64, String)> = (0..group.len()).map(|i| (i as f64, String::new())).collect();
            draw_bars(panel, &Axes::new("", "", y_label), bars, 0.6, &ticks, &labels)?;
        }
        Ok(())
    })
}

fn normalize_noise(backgrounds: &[Background], config: &Config, out_dir: &Path) -> Result<()> {
    let loaded = load_all(backgrounds, RAW_NOISE_WORKBOOK)?;
    let groups = partition(&loaded, &config.normalize_groups)?;
    let mut wb = Workbook::new(NORMALIZED_NOISE_WORKBOOK);
    let mut bars = Vec::new();
    for group in groups {
        let (raw, normalized) = noise_bar::read_noise(group)?;
        let label = group_label(group);
        let names = group_names(group);
        wb.add_sheet(&format!("{}_summary", label), noise_summary_sheet(&names, &normalized)?);
        wb.add_sheet(&format!("{}_spss", label), noise_bar::spss_sheet(&names, &raw, &normalized)?);

        let totals: Vec<Summary> = normalized.iter().map(|n| n.summaries()[0]).collect();
        let heights: Vec<f64> = totals.iter().map(|s| s.mean).collect();
        let errs: Vec<f64> = totals.iter().map(|s| 2.0 * s.se).collect();
        bars.push((group, relative_bars(group, &heights, &errs)));
    }
    wb.save(out_dir)?;
    plot_groups(&out_dir.join("normalized_noise.png"), config, "Normalized Noise", &bars, &loaded)
}

fn normalize_amplitude(backgrounds: &[Background], config: &Config, out_dir: &Path) -> Result<()> {
    let loaded = load_all(backgrounds, SPATIAL_AMPLITUDE_WORKBOOK)?;
    let groups = partition(&loaded, &config.normalize_groups)?;
    let mut wb = Workbook::new(NORMALIZED_AMPLITUDE_WORKBOOK);
    let mut bars = Vec::new();
    for group in groups {
        let amplitudes = normalized_amplitudes(group)?;
        let label = group_label(group);
        let names = group_names(group);
        wb.add_sheet(&format!("{}_summary", label), amplitude_summary_sheet(&names, &amplitudes)?);
        wb.add_sheet(&format!("{}_spss", label), amplitude_spss_sheet(&names, &amplitudes)?);

        let summaries: Vec<Summary> = amplitudes.iter().map(|(_, n)| Summary::of(n)).collect();
        let heights: Vec<f64> = summaries.iter().map(|s| s.mean).collect();
        let errs: Vec<f64> = summaries.iter().map(|s| s.se).collect();
        bars.push((group, relative_bars(group, &heights, &errs)));
    }
    wb.save(out_dir)?;
    plot_groups(&out_dir.join("normalized_herAmp.png"), config, "Total her amplitude", &bars, &loaded)
}

/// Total noise and her amplitude of each background group normalised to the group's first background.
pub fn run(backgrounds: &[Background], config: &Config, out_dir: &Path) -> Result<()> {
    info!(
        "Normalising {} backgrounds in groups {:?}",
        backgrounds.len(),
        config.normalize_groups
    );
    normalize_noise(backgrounds, config, out_dir)?;
    normalize_amplitude(backgrounds, config, out_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::fixtures::{background, save};
    use crate::helper_functions::f64_column;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn partition_requires_matching_sizes() {
        let items = [1, 2, 3, 4, 5];
        let groups = partition(&items, &[3, 2]).unwrap();
        assert_eq!(groups, vec![&[1, 2, 3][..], &[4, 5][..]]);
        assert!(partition(&items, &[2, 2]).is_err());
    }

    fn amplitude_sheet(values: &[f64]) -> DataFrame {
        let mut group: Vec<String> = (1..=values.len()).map(|i| i.to_string()).collect();
        group.push("Average".into());
        let mut amplitude = values.to_vec();
        amplitude.push(values.iter().sum::<f64>() / values.len() as f64);
        let se = vec![0.0; amplitude.len()];
        df!("Group" => group, "Amplitude" => amplitude, "Std error" => se).unwrap()
    }

    #[test]
    fn amplitudes_are_relative_to_group_head() {
        let dir = tempfile::tempdir().unwrap();
        let backgrounds = vec![
            background(dir.path(), "dmso", "#FA5858"),
            background(dir.path(), "dapt", "#0000FF"),
        ];
        save(&backgrounds[0], SPATIAL_AMPLITUDE_WORKBOOK, vec![("Her", amplitude_sheet(&[8.0, 12.0]))]);
        save(&backgrounds[1], SPATIAL_AMPLITUDE_WORKBOOK, vec![("Her", amplitude_sheet(&[5.0, 15.0, 10.0]))]);
        let loaded = load_all(&backgrounds, SPATIAL_AMPLITUDE_WORKBOOK).unwrap();

        let amplitudes = normalized_amplitudes(&loaded).unwrap();
        assert_eq!(amplitudes[0].1, vec![0.8, 1.2]);
        assert_eq!(amplitudes[1].1, vec![0.5, 1.5, 1.0]);

        let names = group_names(&loaded);
        let spss = amplitude_spss_sheet(&names, &amplitudes).unwrap();
        assert_eq!(spss.height(), 5);
        let summary = amplitude_summary_sheet(&names, &amplitudes).unwrap();
        let avg = f64_column(&summary, "average_normalized_amplitude").unwrap();
        assert_approx_eq!(avg[1].unwrap(), 1.0);

        let bars = relative_bars(&loaded, &[1.0, 2.0], &[0.1, 0.2]);
        assert_eq!(bars[1].height, 2.0);
        assert_eq!(bars[1].err, 0.2);
    }

    #[test]
    fn noise_summary_orders_intrinsic_first() {
        let normalized = vec![NoiseValues {
            values: [vec![1.0, 1.0], vec![0.5, 1.5], vec![2.0, 2.0]],
        }];
        let df = noise_summary_sheet(&["wt".to_string()], &normalized).unwrap();
        assert_eq!(df.get_column_names()[1].as_str(), "normalized_in_noise_avg");
        assert_eq!(f64_column(&df, "normalized_tot_noise_avg").unwrap(), vec![Some(1.0)]);
        assert_eq!(f64_column(&df, "nor_ex_noise_err").unwrap(), vec![Some(0.0)]);
        // intrinsic 0.5, 1.5: pstd 0.5, 2se = 1 / sqrt(2)
        assert_approx_eq!(f64_column(&df, "nor_in_noise_err").unwrap()[0].unwrap(), 1.0 / 2f64.sqrt());
    }
}
