use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::analysis::cv_squared::{CV_SQUARED_WORKBOOK, GROUP_NAMES};
use crate::comparison::{load_all, Loaded};
use crate::config::Config;
use crate::data_handling::workbook::Workbook;
use crate::errors::Result;
use crate::helper_functions::{f64_column, f64_values, frame, int_col, num_col, opt_col, str_col};
use crate::models::{Background, Gene};
use crate::plotting::{draw_chart, save_figure, Axes, ErrorPoint, PlotSeries};

pub const COMPARE_GROUPED_WORKBOOK: &str = "compare_grouped_CVsquared_her";

/// CV² and its standard error of one expression group at every cell position; `None` where empty.
pub fn group_track(her: &DataFrame, group: &str) -> Result<Vec<Option<(f64, f64)>>> {
    let cv2 = f64_column(her, &format!("{} CV2", group))?;
    let se = f64_column(her, &format!("{} CV2 se", group))?;
    let count = f64_column(her, &format!("{} count", group))?;
    Ok((0..her.height())
        .map(|i| match (count[i], cv2[i]) {
            (Some(c), Some(v)) if c > 0.0 => Some((v, se[i].unwrap_or(0.0))),
            _ => None,
        })
        .collect())
}

fn tracks(loaded: &[Loaded]) -> Result<Vec<[Vec<Option<(f64, f64)>>; 3]>> {
    loaded
        .iter()
        .map(|l| {
            let her = l.workbook.sheet(Gene::Her.sheet_name())?;
            Ok([
                group_track(her, GROUP_NAMES[0])?,
                group_track(her, GROUP_NAMES[1])?,
                group_track(her, GROUP_NAMES[2])?,
            ])
        })
        .collect()
}

/// Background, position and the three groups' CV² with standard errors.
pub fn summary_sheet(names: &[String], tracks: &[[Vec<Option<(f64, f64)>>; 3]]) -> Result<DataFrame> {
    let mut background = Vec::new();
    let mut position = Vec::new();
    let mut values: [Vec<Option<f64>>; 6] = Default::default();
    for (name, t) in names.iter().zip(tracks) {
        let n = t.iter().map(Vec::len).max().unwrap_or(0);
        for i in 0..n {
            background.push(name.clone());
            position.push(i as i64);
            for k in 0..3 {
                let entry = t[k].get(i).copied().flatten();
                values[2 * k].push(entry.map(|e| e.0));
                values[2 * k + 1].push(entry.map(|e| e.1));
            }
        }
    }
    let mut columns = vec![str_col("Genetic background", background), int_col("Slice index", position)];
    for (k, g) in GROUP_NAMES.iter().enumerate() {
        columns.push(opt_col(&format!("{}_cv2", g), std::mem::take(&mut values[2 * k])));
        columns.push(opt_col(&format!("{}_ste", g), std::mem::take(&mut values[2 * k + 1])));
    }
    frame(columns)
}

/// Every slice CV² of expression group `group` across backgrounds.
pub fn group_long_sheet(loaded: &[Loaded], group: &str) -> Result<DataFrame> {
    let mut background = Vec::new();
    let mut cv2 = Vec::new();
    for l in loaded {
        let values = f64_values(l.workbook.sheet(&format!("her_{}", group))?, "cv2")?;
        background.extend(std::iter::repeat(l.name.clone()).take(values.len()));
        cv2.extend(values);
    }
    frame(vec![str_col("Genetic background", background), num_col("cv2", &cv2)])
}

fn capitalised(group: &str) -> String {
    let mut c = group.chars();
    c.next()
        .map(|f| f.to_ascii_uppercase().to_string() + c.as_str())
        .unwrap_or_default()
}

pub fn run(backgrounds: &[Background], config: &Config, out_dir: &Path) -> Result<()> {
    info!("Comparing grouped her CV² of {} backgrounds", backgrounds.len());
    let loaded = load_all(backgrounds, CV_SQUARED_WORKBOOK)?;
    let tracks = tracks(&loaded)?;
    let names: Vec<String> = loaded.iter().map(|l| l.name.clone()).collect();

    let mut wb = Workbook::new(COMPARE_GROUPED_WORKBOOK);
    wb.add_sheet("summary", summary_sheet(&names, &tracks)?);
    for g in GROUP_NAMES {
        wb.add_sheet(&format!("her_{}", g), group_long_sheet(&loaded, g)?);
    }
    wb.save(out_dir)?;

    let size = (config.figure.width * 3 / 2, config.figure.height);
    save_figure(&out_dir.join("compare_grouped_CVsquared.png"), size, (1, 3), |panels| {
        for (k, g) in GROUP_NAMES.iter().enumerate() {
            let series: Vec<PlotSeries> = loaded
                .iter()
                .zip(&tracks)
                .map(|(l, t)| {
                    let points = t[k]
                        .iter()
                        .enumerate()
                        .filter_map(|(i, e)| e.map(|(v, se)| ErrorPoint::new(i as f64, v).y_err(2.0 * se)))
                        .collect();
                    PlotSeries::new(l.colour, points).label(&l.name).size(4)
                })
                .collect();
            let axes = Axes::new(
                &format!("{} expression", capitalised(g)),
                "Cell position (posterior - anterior)",
                "CV² (her)",
            );
            draw_chart(&panels[k], &axes, &series)?;
        }
        Ok(())
    })
}
