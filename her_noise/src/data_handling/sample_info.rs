use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, DataType, Reader};
use tracing::info;

use crate::data_handling::slices::numeric;
use crate::errors::{NoiseError, Result};
use crate::helper_functions::require_file;
use crate::models::Dataset;

const SHEET: &str = "Sheet1";

/// Imaging parameters of one embryo in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub left_angle: f64,
    pub right_angle: f64,
    pub her1_mean: f64,
    pub her7_mean: f64,
    pub her1_variance: f64,
    pub her7_variance: f64,
}

pub struct SampleInfoDataset {
    pub path: PathBuf,
}

impl SampleInfoDataset {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        SampleInfoDataset {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Dataset for SampleInfoDataset {
    type Output = Vec<SampleRecord>;

    fn load(&self) -> Result<Vec<SampleRecord>> {
        require_file(&self.path)?;
        let mut wb = open_workbook_auto(&self.path).map_err(|e| NoiseError::Workbook {
            source: e,
            path: self.path.clone(),
        })?;
        let range = wb
            .worksheet_range(SHEET)
            .ok_or_else(|| NoiseError::MissingSheet {
                path: self.path.clone(),
                sheet: SHEET.to_string(),
            })?
            .map_err(|e| NoiseError::Workbook {
                source: e,
                path: self.path.clone(),
            })?;

        let records = parse_sample_rows(range.rows().skip(1))?;
        info!("Read {} embryos from {}", records.len(), self.path.display());
        Ok(records)
    }
}

/// Column 2 and 3 hold the region angles, 4..=7 the somite means and variances.
pub fn parse_sample_rows<'a, I>(rows: I) -> Result<Vec<SampleRecord>>
where
    I: Iterator<Item = &'a [DataType]>,
{
    let mut records = Vec::new();
    for (i, row) in rows.enumerate() {
        if row.iter().all(|c| matches!(c, DataType::Empty)) {
            continue;
        }
        let field = |col: usize| -> Result<f64> {
            row.get(col).and_then(numeric).ok_or_else(|| {
                NoiseError::InvalidInput(format!(
                    "sample row {} column {} is not a number",
                    i + 2,
                    col + 1
                ))
            })
        };
        records.push(SampleRecord {
            left_angle: 180.0 + field(2)?,
            right_angle: field(3)? - 180.0,
            her1_mean: field(4)?,
            her7_mean: field(5)?,
            her1_variance: field(6)?,
            her7_variance: field(7)?,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn angles_are_shifted_by_half_turn() {
        let rows = vec![
            vec![
                DataType::String("E1".into()),
                DataType::Empty,
                DataType::Float(10.0),
                DataType::Float(200.0),
                DataType::Float(31.5),
                DataType::Int(28),
                DataType::Float(4.0),
                DataType::Float(5.5),
            ],
            vec![DataType::Empty; 8],
        ];
        let records = parse_sample_rows(rows.iter().map(|r| r.as_slice())).unwrap();
        assert_eq!(records.len(), 1);
        assert_approx_eq!(records[0].left_angle, 190.0);
        assert_approx_eq!(records[0].right_angle, 20.0);
        assert_approx_eq!(records[0].her7_mean, 28.0);
        assert_approx_eq!(records[0].her7_variance, 5.5);
    }

    #[test]
    fn non_numeric_field_is_an_error() {
        let rows = vec![vec![
            DataType::Empty,
            DataType::Empty,
            DataType::String("x".into()),
        ]];
        assert!(parse_sample_rows(rows.iter().map(|r| r.as_slice())).is_err());
    }
}
