pub mod cv_squared;
pub mod fano_factor;
pub mod fill_area;
pub mod grouped_cv_squared;
pub mod noise;
pub mod noise_bar;
pub mod normalized;
pub mod spatial_amplitude;

use plotters::style::RGBColor;
use tracing::debug;

use crate::analysis::cv_squared::CV_SQUARED_WORKBOOK;
use crate::analysis::fano_factor::FANO_WORKBOOK;
use crate::analysis::noise::NOISE_WORKBOOK;
use crate::analysis::raw_noise::RAW_NOISE_WORKBOOK;
use crate::analysis::spatial_amplitude::SPATIAL_AMPLITUDE_WORKBOOK;
use crate::data_handling::workbook::Workbook;
use crate::errors::{NoiseError, Result};
use crate::models::Background;
use crate::plotting::parse_colour;

/// Outputs of `combine` that the comparison stages read from every background folder.
pub const REQUIRED_WORKBOOKS: [&str; 5] = [
    SPATIAL_AMPLITUDE_WORKBOOK,
    FANO_WORKBOOK,
    NOISE_WORKBOOK,
    RAW_NOISE_WORKBOOK,
    CV_SQUARED_WORKBOOK,
];

/// One loaded workbook of a background together with its display settings.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub name: String,
    pub colour: RGBColor,
    pub workbook: Workbook,
}

/// Fails on the first background folder missing one of [`REQUIRED_WORKBOOKS`].
pub fn check_inputs(backgrounds: &[Background]) -> Result<()> {
    if backgrounds.is_empty() {
        return Err(NoiseError::InvalidInput("no genetic backgrounds given".into()));
    }
    for b in backgrounds {
        parse_colour(&b.colour)?;
        for name in REQUIRED_WORKBOOKS {
            if !Workbook::exists(&b.folder, name) {
                return Err(NoiseError::MissingFile(Workbook::location(&b.folder, name)));
            }
        }
        debug!("Inputs of {} found in {}", b.name, b.folder.display());
    }
    Ok(())
}

/// Loads workbook `name` of every background, in input order.
pub fn load_all(backgrounds: &[Background], name: &str) -> Result<Vec<Loaded>> {
    backgrounds
        .iter()
        .map(|b| {
            Ok(Loaded {
                name: b.name.clone(),
                colour: parse_colour(&b.colour)?,
                workbook: Workbook::load(&b.folder, name)?,
            })
        })
        .collect()
}

pub fn legend(loaded: &[Loaded]) -> Vec<(String, RGBColor)> {
    loaded.iter().map(|l| (l.name.clone(), l.colour)).collect()
}

/// Bar position of background `j` in group `i` when groups of `n` bars are separated by one gap.
pub fn grouped_x(i: usize, j: usize, n: usize) -> f64 {
    (i * (n + 1) + j) as f64
}

/// Centre of group `i` in a [`grouped_x`] layout.
pub fn group_centre(i: usize, n: usize) -> f64 {
    (i * (n + 1)) as f64 + (n as f64 - 1.0) / 2.0
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::Path;

    use polars::prelude::*;

    use crate::data_handling::workbook::Workbook;
    use crate::models::Background;

    pub fn background(dir: &Path, name: &str, colour: &str) -> Background {
        Background {
            folder: dir.join(name),
            name: name.to_string(),
            colour: colour.to_string(),
        }
    }

    pub fn save(b: &Background, name: &str, sheets: Vec<(&str, DataFrame)>) {
        let mut wb = Workbook::new(name);
        for (sheet, df) in sheets {
            wb.add_sheet(sheet, df);
        }
        wb.save(&b.folder).unwrap();
    }
}
