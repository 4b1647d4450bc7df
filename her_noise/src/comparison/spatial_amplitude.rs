use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::analysis::spatial_amplitude::SPATIAL_AMPLITUDE_WORKBOOK;
use crate::comparison::{group_centre, grouped_x, legend, load_all, Loaded};
use crate::config::Config;
use crate::data_handling::workbook::Workbook;
use crate::errors::{NoiseError, Result};
use crate::helper_functions::{f64_column, frame, int_col, opt_col, string_column};
use crate::models::{Background, Gene};
use crate::plotting::{draw_bars, save_figure, Axes, Bar};

pub const COMPARE_AMPLITUDE_WORKBOOK: &str = "compare_spatial_amplitude";

/// Section amplitudes of one gene in one background and their average row.
#[derive(Debug, Clone, PartialEq)]
pub struct AmplitudeSummary {
    pub sections: Vec<f64>,
    pub mean: f64,
    pub se: f64,
}

/// Splits an amplitude sheet into its section rows and the `Average` row.
pub fn read_amplitudes(sheet: &DataFrame) -> Result<AmplitudeSummary> {
    let groups = string_column(sheet, "Group")?;
    let amplitude = f64_column(sheet, "Amplitude")?;
    let se = f64_column(sheet, "Std error")?;

    let mut summary = AmplitudeSummary {
        sections: Vec::new(),
        mean: f64::NAN,
        se: f64::NAN,
    };
    let mut found = false;
    for ((g, a), s) in groups.iter().zip(&amplitude).zip(&se) {
        if g.as_deref() == Some("Average") {
            summary.mean = a.unwrap_or(f64::NAN);
            summary.se = s.unwrap_or(f64::NAN);
            found = true;
        } else if let Some(a) = a {
            summary.sections.push(*a);
        }
    }
    if !found {
        return Err(NoiseError::InvalidInput("amplitude sheet has no Average row".into()));
    }
    Ok(summary)
}

fn gene_summaries(loaded: &[Loaded]) -> Result<Vec<[AmplitudeSummary; 2]>> {
    loaded
        .iter()
        .map(|l| {
            Ok([
                read_amplitudes(l.workbook.sheet(Gene::Her1.sheet_name())?)?,
                read_amplitudes(l.workbook.sheet(Gene::Her7.sheet_name())?)?,
            ])
        })
        .collect()
}

/// Long table of every background's section amplitudes, background numbered from 1.
pub fn raw_sheet(summaries: &[[AmplitudeSummary; 2]]) -> Result<DataFrame> {
    let mut background = Vec::new();
    let (mut her1, mut her7) = (Vec::new(), Vec::new());
    for (i, [a, b]) in summaries.iter().enumerate() {
        for k in 0..a.sections.len().max(b.sections.len()) {
            background.push(i as i64 + 1);
            her1.push(a.sections.get(k).copied());
            her7.push(b.sections.get(k).copied());
        }
    }
    frame(vec![
        int_col("Genetic background", background),
        opt_col("Her1 amplitude", her1),
        opt_col("Her7 amplitude", her7),
    ])
}

pub fn amplitude_bars(loaded: &[Loaded], summaries: &[[AmplitudeSummary; 2]]) -> Vec<Bar> {
    let n = loaded.len();
    let mut bars = Vec::new();
    for (j, (l, genes)) in loaded.iter().zip(summaries).enumerate() {
        for (i, s) in genes.iter().enumerate() {
            bars.push(Bar {
                x: grouped_x(i, j, n),
                height: s.mean,
                err: 2.0 * s.se,
                colour: l.colour,
            });
        }
    }
    bars
}

pub fn run(backgrounds: &[Background], config: &Config, out_dir: &Path) -> Result<()> {
    info!("Comparing spatial amplitude of {} backgrounds", backgrounds.len());
    let loaded = load_all(backgrounds, SPATIAL_AMPLITUDE_WORKBOOK)?;
    let summaries = gene_summaries(&loaded)?;

    let mut wb = Workbook::new(COMPARE_AMPLITUDE_WORKBOOK);
    wb.add_sheet("raw", raw_sheet(&summaries)?);
    wb.save(out_dir)?;

    let n = loaded.len();
    let bars = amplitude_bars(&loaded, &summaries);
    let ticks = vec![
        (group_centre(0, n), Gene::Her1.label().to_string()),
        (group_centre(1, n), Gene::Her7.label().to_string()),
    ];
    let axes = Axes::new("", "", "Spatial amplitude");
    let size = (config.figure.width, config.figure.height);
    save_figure(&out_dir.join("compare_spatial_amplitude.png"), size, (1, 1), |p| {
        draw_bars(&p[0], &axes, &bars, 0.8, &ticks, &legend(&loaded))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::fixtures::{background, save};
    use assert_approx_eq::assert_approx_eq;

    fn sheet(values: &[f64], mean: f64, se: f64) -> DataFrame {
        let mut group: Vec<String> = (1..=values.len()).map(|i| i.to_string()).collect();
        group.push("Average".into());
        let mut amplitude = values.to_vec();
        amplitude.push(mean);
        let mut ses = vec![0.5; values.len()];
        ses.push(se);
        df!("Group" => group, "Amplitude" => amplitude, "Std error" => ses).unwrap()
    }

    #[test]
    fn average_row_is_separated_from_sections() {
        let s = read_amplitudes(&sheet(&[10.0, 14.0], 12.0, 2.0)).unwrap();
        assert_eq!(s.sections, vec![10.0, 14.0]);
        assert_eq!((s.mean, s.se), (12.0, 2.0));

        let no_average = df!("Group" => ["1"], "Amplitude" => [1.0], "Std error" => [0.1]).unwrap();
        assert!(read_amplitudes(&no_average).is_err());
    }

    #[test]
    fn bars_are_grouped_by_gene() {
        let dir = tempfile::tempdir().unwrap();
        let backgrounds = vec![
            background(dir.path(), "wt", "g"),
            background(dir.path(), "deltac", "r"),
        ];
        for (k, b) in backgrounds.iter().enumerate() {
            let scale = k as f64 + 1.0;
            save(b, SPATIAL_AMPLITUDE_WORKBOOK, vec![
                ("Her1", sheet(&[10.0 * scale, 20.0 * scale], 15.0 * scale, 1.0)),
                ("Her7", sheet(&[4.0 * scale], 4.0 * scale, 0.0)),
            ]);
        }
        let loaded = load_all(&backgrounds, SPATIAL_AMPLITUDE_WORKBOOK).unwrap();
        let summaries = gene_summaries(&loaded).unwrap();
        let bars = amplitude_bars(&loaded, &summaries);
        let xs: Vec<f64> = bars.iter().map(|b| b.x).collect();
        assert_eq!(xs, vec![0.0, 3.0, 1.0, 4.0]);
        assert_approx_eq!(bars[2].height, 30.0);
        assert_approx_eq!(bars[0].err, 2.0);

        let raw = raw_sheet(&summaries).unwrap();
        assert_eq!(raw.height(), 4);
        assert_eq!(
            f64_column(&raw, "Her7 amplitude").unwrap(),
            vec![Some(4.0), None, Some(8.0), None]
        );
    }
}
